//! Error types for tool call normalization.

use thiserror::Error;

pub type ParserResult<T> = Result<T, ParserError>;

#[derive(Debug, Error)]
pub enum ParserError {
    /// Candidate text could not be parsed as JSON or JSON5.
    #[error("Parsing failed: {0}")]
    ParsingFailed(String),

    /// JSON5 tokenizer/parser rejected the input at a byte offset.
    #[error("Invalid JSON5 at offset {offset}: {message}")]
    Json5 { message: String, offset: usize },

    /// Input could not be repaired into valid JSON.
    #[error("Repair failed: {0}")]
    RepairFailed(String),

    /// The whole parse exceeded the configured time budget.
    #[error("Parsing timed out after {0}ms")]
    Timeout(u64),

    /// Streaming buffer grew past the configured cap.
    #[error("Stream buffer exceeded {0} bytes")]
    BufferOverflow(usize),
}
