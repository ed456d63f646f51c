//! Parser configuration and per-call context.

use serde::{Deserialize, Serialize};

use crate::types::ExtractionMethod;

/// Model families the caller can tag a parse with.
///
/// The tag selects a built-in known-issues pack; it never changes the
/// extraction pipeline itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Claude,
    Openai,
    Gemini,
    Ollama,
    Qwen,
    Llama,
    Mistral,
    Other,
}

/// One model-specific repair rule: a regex pattern, a replacement, and a
/// label recorded when the rule fires. Applied before the generic rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownIssue {
    pub pattern: String,
    pub replacement: String,
    pub label: String,
}

impl KnownIssue {
    pub fn new(
        pattern: impl Into<String>,
        replacement: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            label: label.into(),
        }
    }
}

/// Built-in known-issue packs for model families with well-known quirks.
pub fn known_issues_for(family: ModelFamily) -> Vec<KnownIssue> {
    match family {
        // Local llama-family checkpoints tend to emit a python tag prefix
        // and python literals.
        ModelFamily::Llama => vec![
            KnownIssue::new(r"<\|python_tag\|>", "", "strip_python_tag"),
            KnownIssue::new(r";\s*$", "", "strip_trailing_semicolon"),
        ],
        ModelFamily::Qwen => vec![
            KnownIssue::new(r"</?tool_call>", "", "strip_tool_call_tags"),
        ],
        ModelFamily::Mistral => vec![
            KnownIssue::new(r"\[/?TOOL_CALLS\]", "", "strip_tool_calls_marker"),
        ],
        _ => Vec::new(),
    }
}

/// Per-call context: model identity and tuned repair rules.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    pub model: Option<ModelFamily>,
    pub model_version: Option<String>,
    /// Model-specific repair rules, applied before the generic rules.
    pub known_issues: Vec<KnownIssue>,
    /// Incremented once per fallback stage entered.
    pub fallback_level: u8,
}

impl ParseContext {
    pub fn for_model(family: ModelFamily) -> Self {
        Self {
            model: Some(family),
            known_issues: known_issues_for(family),
            ..Default::default()
        }
    }
}

/// Parser options. Field defaults match `ParserConfig::default()`.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Any validation error fails a call.
    pub strict_mode: bool,
    /// Accept partial/incomplete calls as success with lower confidence.
    pub allow_partial: bool,
    /// Enable the repair pipeline and fallback stage A.
    pub attempt_repairs: bool,
    /// Enable fallback stage B.
    pub use_fallbacks: bool,
    /// Bound on repair pipeline re-runs.
    pub max_repair_attempts: usize,
    /// Upper bound on one parse call, in milliseconds.
    pub timeout_ms: u64,
    /// Use the JSON5 parser as fallback to strict JSON.
    pub enable_json5: bool,
    pub fuzzy_tool_matching: bool,
    /// Minimum similarity for fuzzy tool matches.
    pub fuzzy_match_threshold: f64,
    /// Enable alias-map parameter resolution.
    pub semantic_param_mapping: bool,
    /// Enable parameter type coercion.
    pub type_coercion: bool,
    /// Ordered list of enabled extraction methods.
    pub extraction_methods: Vec<ExtractionMethod>,
    /// Drop candidates scoring below this confidence.
    pub min_extraction_confidence: f64,
    /// Use schema defaults for missing required parameters.
    pub inject_defaults: bool,
    /// Enforce per-property schema rules.
    pub validate_schema: bool,
    /// Enable type coercion inside the validator.
    pub coerce_types: bool,
    /// Truncation bound for the raw-output snippet in metadata.
    pub max_snippet_length: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            allow_partial: true,
            attempt_repairs: true,
            use_fallbacks: true,
            max_repair_attempts: 3,
            timeout_ms: 5000,
            enable_json5: true,
            fuzzy_tool_matching: true,
            fuzzy_match_threshold: 0.7,
            semantic_param_mapping: true,
            type_coercion: true,
            extraction_methods: vec![
                ExtractionMethod::MarkdownCodeblock,
                ExtractionMethod::AstBalanced,
                ExtractionMethod::Json5Parse,
                ExtractionMethod::RegexFullJson,
                ExtractionMethod::InlineJson,
                ExtractionMethod::RegexPartial,
            ],
            min_extraction_confidence: 0.5,
            inject_defaults: true,
            validate_schema: true,
            coerce_types: true,
            max_snippet_length: 200,
        }
    }
}

impl ParserConfig {
    /// Strict preset: every validation error fails the call.
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            ..Default::default()
        }
    }
}
