//! Streaming driver for incremental model output.
//!
//! Consumes chunks, tracks bracket/string state across them, surfaces
//! partial tool calls as soon as a name key appears, and hands the full
//! buffer to the top-level parser when the stream ends. The driver does
//! work only on caller-driven input; it never blocks and never spawns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::parser::ToolCallParser;
use crate::repair::close_truncated;
use crate::types::{
    clamp_confidence, ParseProgress, ParsingResult, PartialToolCall, StreamState, StreamUpdate,
    ValidationWarning,
};

/// Default cap on the accumulation buffer.
const DEFAULT_MAX_BUFFER_SIZE: usize = 65536;

/// Confidence for a tool name seen before its object closed, and after.
const PARTIAL_CONFIDENCE: f64 = 0.5;
const COMPLETED_CONFIDENCE: f64 = 0.9;

/// Multiplier for calls recovered by completing an unfinished buffer.
const COMPLETION_PENALTY: f64 = 0.7;

pub struct StreamingParser {
    parser: Arc<ToolCallParser>,
    name_probe: Regex,

    buffer: String,
    stack: Vec<char>,
    in_string: bool,
    escape_next: bool,
    /// Buffer offset just past the last completed top-level value.
    watermark: usize,

    completed: Vec<Value>,
    completed_partials: Vec<PartialToolCall>,
    pending_partial: Option<PartialToolCall>,

    progress_interval: Duration,
    last_emit: Option<Instant>,
    max_buffer_size: usize,
    overflowed: bool,
    finished: bool,
}

impl StreamingParser {
    pub fn new(parser: Arc<ToolCallParser>) -> Self {
        Self::with_interval(parser, Duration::from_millis(100))
    }

    /// `progress_interval` throttles incremental updates; zero emits on
    /// every feed.
    pub fn with_interval(parser: Arc<ToolCallParser>, progress_interval: Duration) -> Self {
        Self {
            parser,
            name_probe: Regex::new(r#""(?:tool|name|function|action)"\s*:\s*"([^"]*)""#).unwrap(),
            buffer: String::new(),
            stack: Vec::new(),
            in_string: false,
            escape_next: false,
            watermark: 0,
            completed: Vec::new(),
            completed_partials: Vec::new(),
            pending_partial: None,
            progress_interval,
            last_emit: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            overflowed: false,
            finished: false,
        }
    }

    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Feed one chunk. Returns the updates this chunk produced: at most
    /// one throttled incremental update, plus one per completed object.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamUpdate> {
        let mut updates = Vec::new();
        if self.finished {
            updates.push(StreamUpdate::Error(
                "stream already finished; call reset() first".to_string(),
            ));
            return updates;
        }

        if self.buffer.len() + chunk.len() > self.max_buffer_size {
            self.buffer.push_str(chunk);
            if !self.overflowed {
                self.overflowed = true;
                debug!("stream buffer exceeded {} bytes", self.max_buffer_size);
                updates.push(StreamUpdate::Error(format!(
                    "stream buffer exceeded {} bytes; buffering without incremental parsing",
                    self.max_buffer_size
                )));
            }
            return updates;
        }

        let mut object_completed = false;
        for c in chunk.chars() {
            self.buffer.push(c);
            if self.step(c) {
                object_completed |= self.try_complete_object();
            }
        }
        self.probe_partial();
        if object_completed {
            self.last_emit = Some(Instant::now());
            updates.push(StreamUpdate::Incremental(self.progress()));
        } else if self.should_emit() {
            self.last_emit = Some(Instant::now());
            updates.push(StreamUpdate::Incremental(self.progress()));
        }
        updates
    }

    /// Advance the bracket/string machine by one character. Returns
    /// true when a close just emptied the stack.
    fn step(&mut self, c: char) -> bool {
        if self.in_string {
            if self.escape_next {
                self.escape_next = false;
            } else if c == '\\' {
                self.escape_next = true;
            } else if c == '"' {
                self.in_string = false;
            }
            return false;
        }
        match c {
            '{' | '[' => self.stack.push(c),
            '}' => {
                if self.stack.last() == Some(&'{') {
                    self.stack.pop();
                    return self.stack.is_empty();
                }
                // Mismatched close is ignored.
            }
            ']' => {
                if self.stack.last() == Some(&'[') {
                    self.stack.pop();
                    return self.stack.is_empty();
                }
            }
            '"' => self.in_string = true,
            _ => {}
        }
        false
    }

    /// With the stack empty, attempt a strict parse of the region after
    /// the last completed value, starting at its first `{`/`[`.
    fn try_complete_object(&mut self) -> bool {
        let region = &self.buffer[self.watermark..];
        if region.trim().is_empty() {
            return false;
        }
        let Some(start) = region.find(['{', '[']) else {
            return false;
        };
        match serde_json::from_str::<Value>(region[start..].trim()) {
            Ok(value) => {
                self.completed.push(value);
                self.watermark = self.buffer.len();
                if let Some(mut partial) = self.pending_partial.take() {
                    partial.confidence = COMPLETED_CONFIDENCE;
                    self.completed_partials.push(partial);
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Record the earliest tool-name key in the pending region as a
    /// partial call.
    fn probe_partial(&mut self) {
        let region = &self.buffer[self.watermark..];
        if let Some(caps) = self.name_probe.captures(region) {
            let name = caps[1].to_string();
            let keep = match &self.pending_partial {
                Some(existing) => existing.name != name,
                None => true,
            };
            if keep {
                self.pending_partial = Some(PartialToolCall {
                    name,
                    confidence: PARTIAL_CONFIDENCE,
                });
            }
        }
    }

    fn should_emit(&self) -> bool {
        match self.last_emit {
            None => true,
            Some(at) => at.elapsed() >= self.progress_interval,
        }
    }

    /// Snapshot of the current incremental state.
    pub fn progress(&self) -> ParseProgress {
        let state = if self.finished {
            StreamState::Complete
        } else if self.buffer.trim().is_empty() {
            StreamState::Idle
        } else {
            StreamState::Partial
        };
        let mut partial_calls = self.completed_partials.clone();
        if let Some(pending) = &self.pending_partial {
            partial_calls.push(pending.clone());
        }
        ParseProgress {
            state,
            depth: self.stack.len(),
            in_string: self.in_string,
            buffer_len: self.buffer.len(),
            completed_objects: self.completed.len(),
            partial_calls,
        }
    }

    /// End of stream: run the top-level parser over the full buffer and
    /// emit the final update, whether or not the tail parsed cleanly.
    pub async fn finish(&mut self) -> StreamUpdate {
        if self.finished {
            return StreamUpdate::Error(
                "stream already finished; call reset() first".to_string(),
            );
        }
        self.finished = true;
        let result = self.parser.parse(&self.buffer, None).await;
        StreamUpdate::Complete(Box::new(result))
    }

    /// Close the open string and brackets (LIFO), strict-parse, and run
    /// the normal pipeline over the completed text. Calls recovered this
    /// way are penalized and flagged.
    pub fn attempt_completion(&self) -> Option<ParsingResult> {
        let completed = close_truncated(&self.buffer).unwrap_or_else(|| self.buffer.clone());
        let start = completed.find(['{', '['])?;
        serde_json::from_str::<Value>(completed[start..].trim()).ok()?;

        match self.parser.parse_inner(&completed, None) {
            ParsingResult::Success {
                mut calls,
                mut metadata,
            } => {
                for call in &mut calls {
                    call.confidence = clamp_confidence(call.confidence * COMPLETION_PENALTY);
                }
                metadata.confidence =
                    clamp_confidence(metadata.confidence * COMPLETION_PENALTY);
                metadata.warnings.push(ValidationWarning::new(
                    Vec::new(),
                    "parsed from incomplete JSON",
                ));
                Some(ParsingResult::Success { calls, metadata })
            }
            failure => Some(failure),
        }
    }

    /// Clear all state for reuse.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.stack.clear();
        self.in_string = false;
        self.escape_next = false;
        self.watermark = 0;
        self.completed.clear();
        self.completed_partials.clear();
        self.pending_partial = None;
        self.last_emit = None;
        self.overflowed = false;
        self.finished = false;
    }
}
