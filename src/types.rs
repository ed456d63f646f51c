//! Core data model for extraction, validation, and normalized output.
//!
//! Everything that crosses a component boundary lives here: extraction
//! candidates, detected provider formats, pre-validation raw calls,
//! validation errors/warnings, and the normalized tool call records the
//! caller consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a candidate JSON value was located in the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    MarkdownCodeblock,
    AstBalanced,
    RegexFullJson,
    RegexPartial,
    InlineJson,
    Json5Parse,
    Repaired,
}

impl ExtractionMethod {
    /// Static starting confidence for candidates produced by this method.
    pub fn base_confidence(&self) -> f64 {
        match self {
            ExtractionMethod::MarkdownCodeblock => 0.95,
            ExtractionMethod::AstBalanced => 0.85,
            ExtractionMethod::Json5Parse => 0.80,
            ExtractionMethod::RegexFullJson => 0.75,
            ExtractionMethod::InlineJson => 0.70,
            ExtractionMethod::Repaired => 0.60,
            ExtractionMethod::RegexPartial => 0.50,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::MarkdownCodeblock => "markdown_codeblock",
            ExtractionMethod::AstBalanced => "ast_balanced",
            ExtractionMethod::RegexFullJson => "regex_full_json",
            ExtractionMethod::RegexPartial => "regex_partial",
            ExtractionMethod::InlineJson => "inline_json",
            ExtractionMethod::Json5Parse => "json5_parse",
            ExtractionMethod::Repaired => "repaired",
        }
    }
}

/// A candidate JSON value harvested from the raw text.
///
/// Invariant: `0 <= start < end <= |raw text|` and `text[start..end]`,
/// after `repairs` are re-applied, parses to a value structurally equal
/// to `value`.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub value: Value,
    /// The source substring the value was parsed from.
    pub source: String,
    pub start: usize,
    pub end: usize,
    pub method: ExtractionMethod,
    pub confidence: f64,
    /// Names of repair rules applied to obtain `value`, if any.
    pub repairs: Vec<String>,
    /// Validation errors already recorded against this candidate.
    pub errors: Vec<ValidationError>,
}

/// Provider family a candidate is labeled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    ClaudeToolUse,
    OpenaiFunctionCall,
    AnthropicBetaTools,
    OllamaJson,
    QwenStructured,
    LlamaJson,
    GeminiFunctionCall,
    CustomStructured,
    MarkdownJson,
    InlineJson,
    Unknown,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::ClaudeToolUse => "claude_tool_use",
            OutputFormat::OpenaiFunctionCall => "openai_function_call",
            OutputFormat::AnthropicBetaTools => "anthropic_beta_tools",
            OutputFormat::OllamaJson => "ollama_json",
            OutputFormat::QwenStructured => "qwen_structured",
            OutputFormat::LlamaJson => "llama_json",
            OutputFormat::GeminiFunctionCall => "gemini_function_call",
            OutputFormat::CustomStructured => "custom_structured",
            OutputFormat::MarkdownJson => "markdown_json",
            OutputFormat::InlineJson => "inline_json",
            OutputFormat::Unknown => "unknown",
        }
    }
}

/// Format detection outcome.
#[derive(Debug, Clone)]
pub struct DetectedFormat {
    pub format: OutputFormat,
    pub confidence: f64,
    pub version: Option<String>,
    pub metadata: Map<String, Value>,
}

/// Provider-agnostic pre-validation shape of one tool invocation.
#[derive(Debug, Clone, Default)]
pub struct RawToolCall {
    /// Tool name as the model emitted it; absent when the envelope
    /// carried parameters without a name slot.
    pub tool: Option<String>,
    pub parameters: Map<String, Value>,
}

/// Closed set of validation error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    InvalidJsonStructure,
    UnknownTool,
    RequiredParameterMissing,
    SchemaMismatch,
    InvalidType,
    InvalidEnumValue,
    NumberOutOfRange,
    StringPatternMismatch,
}

/// Error severity, from the fixed kind-to-severity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl ValidationErrorKind {
    pub fn severity(&self) -> Severity {
        match self {
            ValidationErrorKind::InvalidJsonStructure => Severity::Critical,
            ValidationErrorKind::UnknownTool => Severity::Critical,
            ValidationErrorKind::RequiredParameterMissing => Severity::High,
            ValidationErrorKind::SchemaMismatch => Severity::High,
            ValidationErrorKind::InvalidType => Severity::Medium,
            ValidationErrorKind::InvalidEnumValue => Severity::Medium,
            ValidationErrorKind::NumberOutOfRange => Severity::Low,
            ValidationErrorKind::StringPatternMismatch => Severity::Low,
        }
    }

    /// Whether this kind alone fails a call in non-strict mode.
    pub fn fails_lenient(&self) -> bool {
        matches!(
            self,
            ValidationErrorKind::UnknownTool | ValidationErrorKind::RequiredParameterMissing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::InvalidJsonStructure => "invalid_json_structure",
            ValidationErrorKind::UnknownTool => "unknown_tool",
            ValidationErrorKind::RequiredParameterMissing => "required_parameter_missing",
            ValidationErrorKind::SchemaMismatch => "schema_mismatch",
            ValidationErrorKind::InvalidType => "invalid_type",
            ValidationErrorKind::InvalidEnumValue => "invalid_enum_value",
            ValidationErrorKind::NumberOutOfRange => "number_out_of_range",
            ValidationErrorKind::StringPatternMismatch => "string_pattern_mismatch",
        }
    }
}

/// A validation error. Returned, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// Key/index path from the root of the call.
    pub path: Vec<String>,
    pub message: String,
    pub suggestion: Option<String>,
    pub expected: Option<String>,
    pub received: Option<String>,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
            suggestion: None,
            expected: None,
            received: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_types(mut self, expected: impl Into<String>, received: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.received = Some(received.into());
        self
    }
}

/// Non-fatal finding that accompanies a successful validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: Vec<String>,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationWarning {
    pub fn new(path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            suggestion: None,
        }
    }
}

/// Record of a runtime type change made to satisfy a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoercedValue {
    /// Parameter the coercion applied to.
    pub parameter: String,
    pub original: Value,
    pub coerced: Value,
    /// Coercion label, e.g. `string_to_number`.
    pub coercion: String,
}

/// How a fuzzy match resolved an input string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAlgorithm {
    Exact,
    Alias,
    JaroWinkler,
    Levenshtein,
}

impl MatchAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchAlgorithm::Exact => "exact",
            MatchAlgorithm::Alias => "alias",
            MatchAlgorithm::JaroWinkler => "jaro_winkler",
            MatchAlgorithm::Levenshtein => "levenshtein",
        }
    }
}

/// Trace left behind when the model's tool name did not match exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzyMatchTrace {
    pub original_name: String,
    pub matched_name: String,
    pub similarity: f64,
    pub algorithm: MatchAlgorithm,
}

/// How one input parameter key was resolved to a schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    Direct,
    CaseInsensitive,
    Alias,
    Fuzzy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterMapping {
    pub source: String,
    pub target: String,
    pub method: MappingMethod,
    pub similarity: f64,
}

/// Per-call metadata carried on every normalized call.
#[derive(Debug, Clone)]
pub struct CallMetadata {
    pub source_format: OutputFormat,
    pub extraction_method: Option<ExtractionMethod>,
    pub fuzzy_match: Option<FuzzyMatchTrace>,
    pub parameter_mappings: Vec<ParameterMapping>,
    pub coercions: Vec<CoercedValue>,
    pub timestamp: DateTime<Utc>,
}

/// The unit of output: one canonical, validated tool invocation.
#[derive(Debug, Clone)]
pub struct NormalizedToolCall {
    /// Synthetic id, unique per call.
    pub id: String,
    /// Canonical tool name exactly as registered.
    pub tool: String,
    pub parameters: Map<String, Value>,
    pub confidence: f64,
    pub format: OutputFormat,
    /// The raw call this was normalized from.
    pub raw: RawToolCall,
    pub metadata: CallMetadata,
}

/// Aggregated metadata for one `parse()` invocation.
#[derive(Debug, Clone, Default)]
pub struct ParseMetadata {
    pub parse_time_ms: u64,
    pub extraction_method: Option<ExtractionMethod>,
    pub format: Option<OutputFormat>,
    pub confidence: f64,
    pub coercions: Vec<CoercedValue>,
    pub warnings: Vec<ValidationWarning>,
    /// Leading snippet of the raw input, bounded by `max_snippet_length`.
    pub raw_snippet: String,
    /// Fallback stage that produced the result, if any.
    pub fallback_strategy: Option<String>,
    pub repairs: Vec<String>,
}

/// Total result of one `parse()` call.
#[derive(Debug, Clone)]
pub enum ParsingResult {
    Success {
        calls: Vec<NormalizedToolCall>,
        metadata: ParseMetadata,
    },
    Failure {
        error: String,
        errors: Vec<ValidationError>,
        suggestions: Vec<String>,
        /// Best-guess partial interpretation, when one is available.
        partial_calls: Vec<NormalizedToolCall>,
        metadata: ParseMetadata,
    },
}

impl ParsingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ParsingResult::Success { .. })
    }

    pub fn calls(&self) -> &[NormalizedToolCall] {
        match self {
            ParsingResult::Success { calls, .. } => calls,
            ParsingResult::Failure { partial_calls, .. } => partial_calls,
        }
    }

    pub fn metadata(&self) -> &ParseMetadata {
        match self {
            ParsingResult::Success { metadata, .. } => metadata,
            ParsingResult::Failure { metadata, .. } => metadata,
        }
    }
}

/// Incremental state reported by the streaming driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Partial,
    Complete,
    Error,
}

/// A tentative tool call seen before its enclosing object closed.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialToolCall {
    pub name: String,
    pub confidence: f64,
}

/// Snapshot of streaming progress.
#[derive(Debug, Clone)]
pub struct ParseProgress {
    pub state: StreamState,
    /// Current bracket nesting depth.
    pub depth: usize,
    pub in_string: bool,
    pub buffer_len: usize,
    pub completed_objects: usize,
    pub partial_calls: Vec<PartialToolCall>,
}

/// Closed sum of streaming updates.
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    Incremental(ParseProgress),
    Complete(Box<ParsingResult>),
    Error(String),
}

/// Clamp a score or confidence into [0, 1].
pub(crate) fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Runtime type name of a JSON value, for error messages.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_confidences() {
        assert_eq!(ExtractionMethod::MarkdownCodeblock.base_confidence(), 0.95);
        assert_eq!(ExtractionMethod::AstBalanced.base_confidence(), 0.85);
        assert_eq!(ExtractionMethod::Json5Parse.base_confidence(), 0.80);
        assert_eq!(ExtractionMethod::RegexFullJson.base_confidence(), 0.75);
        assert_eq!(ExtractionMethod::InlineJson.base_confidence(), 0.70);
        assert_eq!(ExtractionMethod::Repaired.base_confidence(), 0.60);
        assert_eq!(ExtractionMethod::RegexPartial.base_confidence(), 0.50);
    }

    #[test]
    fn test_severities() {
        assert_eq!(
            ValidationErrorKind::InvalidJsonStructure.severity(),
            Severity::Critical
        );
        assert_eq!(ValidationErrorKind::UnknownTool.severity(), Severity::Critical);
        assert_eq!(
            ValidationErrorKind::RequiredParameterMissing.severity(),
            Severity::High
        );
        assert_eq!(
            ValidationErrorKind::NumberOutOfRange.severity(),
            Severity::Low
        );
    }

    #[test]
    fn test_lenient_failure_subset() {
        assert!(ValidationErrorKind::UnknownTool.fails_lenient());
        assert!(ValidationErrorKind::RequiredParameterMissing.fails_lenient());
        assert!(!ValidationErrorKind::InvalidType.fails_lenient());
        assert!(!ValidationErrorKind::SchemaMismatch.fails_lenient());
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_confidence(1.3), 1.0);
        assert_eq!(clamp_confidence(-0.1), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
    }
}
