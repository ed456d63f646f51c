//! Fault-tolerant parser for LLM tool call output.
//!
//! Models emit tool invocations in wildly inconsistent shapes: clean
//! JSON in markdown fences, provider envelopes, JSON5-ish dialects with
//! single quotes and trailing commas, truncated documents, or prose
//! with inline JSON. This crate recovers a canonical tool-call sequence
//! from any of them, with graduated confidence and explicit failure
//! reporting.
//!
//! # Pipeline
//!
//! ```text
//! raw text -> extractor -> format detector -> raw calls -> validator
//!                |             |                              |
//!            repair rules   provider families          registry + fuzzy
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tool_normalizer::{
//!     ParserConfig, PropertySchema, PropertyType, ToolCallParser, ToolRegistry, ToolSchema,
//! };
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(
//!     ToolSchema::new("move", "Move an object")
//!         .with_property("x", PropertySchema::new(PropertyType::Number))
//!         .with_property("y", PropertySchema::new(PropertyType::Number)),
//! );
//!
//! let parser = ToolCallParser::new(Arc::new(registry));
//! let calls = parser.parse_sync(r#"{"tool": "move", "params": {"x": 10, "y": 20}}"#);
//! assert_eq!(calls[0].tool, "move");
//! ```
//!
//! Errors are values throughout: a parse returns a [`ParsingResult`]
//! for any input a string can hold, and the registry is shared
//! read-only across calls.

pub mod config;
pub mod errors;
pub mod extract;
pub mod format;
pub mod fuzzy;
pub mod json5;
pub mod mapping;
pub mod parser;
pub mod registry;
pub mod repair;
pub mod streaming;
pub mod types;
pub mod validate;

pub use config::{known_issues_for, KnownIssue, ModelFamily, ParseContext, ParserConfig};
pub use errors::{ParserError, ParserResult};
pub use extract::{looks_like_tool_call, Extractor};
pub use format::FormatDetector;
pub use fuzzy::{FuzzyMatch, STATIC_PARAM_ALIASES, STATIC_TOOL_ALIASES};
pub use json5::{looks_like_json5, parse_json5, parse_relaxed};
pub use mapping::{MappedParameters, ParameterMapper};
pub use parser::ToolCallParser;
pub use registry::{PropertySchema, PropertyType, ToolRegistry, ToolSchema};
pub use repair::{RepairEngine, RepairOutcome};
pub use streaming::StreamingParser;
pub use types::{
    CallMetadata, CoercedValue, DetectedFormat, ExtractionMethod, ExtractionResult,
    FuzzyMatchTrace, MappingMethod, MatchAlgorithm, NormalizedToolCall, OutputFormat,
    ParameterMapping, ParseMetadata, ParseProgress, ParsingResult, PartialToolCall, RawToolCall,
    Severity, StreamState, StreamUpdate, ValidationError, ValidationErrorKind, ValidationWarning,
};
pub use validate::{SchemaValidator, ValidationOutcome};

