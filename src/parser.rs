//! Top-level parser: extraction, selection, normalization, and the
//! bounded fallback ladder.
//!
//! One `parse` call sequences the pipeline over immutable borrows of
//! the input and returns a total `ParsingResult`; recovery stages never
//! recurse, they run as a linear ladder with a cooperative deadline
//! checked at each stage boundary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{KnownIssue, ParseContext, ParserConfig};
use crate::extract::Extractor;
use crate::format::FormatDetector;
use crate::fuzzy;
use crate::mapping::ParameterMapper;
use crate::registry::ToolRegistry;
use crate::repair::{RepairEngine, TRUNCATION_LABEL};
use crate::types::{
    clamp_confidence, CallMetadata, ExtractionMethod, ExtractionResult, NormalizedToolCall,
    OutputFormat, ParseMetadata, ParsingResult, ValidationError, ValidationWarning,
};
use crate::validate::SchemaValidator;

/// Candidate cap for the primary extraction pass.
const PRIMARY_MAX_CANDIDATES: usize = 5;
/// Stage B widens the net: more candidates, lower floor, repairs on.
const LENIENT_MAX_CANDIDATES: usize = 10;
const LENIENT_MIN_CONFIDENCE: f64 = 0.3;

pub struct ToolCallParser {
    config: ParserConfig,
    registry: Arc<ToolRegistry>,
    extractor: Extractor,
    lenient_extractor: Extractor,
    detector: FormatDetector,
    validator: SchemaValidator,
    repair: RepairEngine,
}

/// What one extraction+validation pass produced.
struct StageResult {
    calls: Vec<NormalizedToolCall>,
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationWarning>,
    method: Option<ExtractionMethod>,
    format: Option<OutputFormat>,
    confidence: f64,
    repairs: Vec<String>,
    found_candidates: bool,
}

impl ToolCallParser {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_config(ParserConfig::default(), registry)
    }

    pub fn with_config(config: ParserConfig, registry: Arc<ToolRegistry>) -> Self {
        // The primary extractor leaves repair to the fallback ladder;
        // only the stage-B extractor runs with repair enabled.
        let extractor = Extractor::new(
            config.extraction_methods.clone(),
            config.min_extraction_confidence,
            PRIMARY_MAX_CANDIDATES,
            false,
            config.enable_json5,
            config.max_repair_attempts,
        );
        let lenient_extractor = Extractor::new(
            config.extraction_methods.clone(),
            LENIENT_MIN_CONFIDENCE,
            LENIENT_MAX_CANDIDATES,
            true,
            config.enable_json5,
            config.max_repair_attempts,
        );
        let validator = SchemaValidator {
            strict: config.strict_mode,
            validate_schema: config.validate_schema,
            fuzzy_tool_matching: config.fuzzy_tool_matching,
            fuzzy_threshold: config.fuzzy_match_threshold,
            mapper: ParameterMapper {
                fuzzy_threshold: fuzzy::PARAM_THRESHOLD,
                semantic_aliases: config.semantic_param_mapping,
                coerce_types: config.type_coercion && config.coerce_types,
                inject_defaults: config.inject_defaults,
                strict: config.strict_mode,
            },
        };
        Self {
            config,
            registry,
            extractor,
            lenient_extractor,
            detector: FormatDetector::new(),
            validator,
            repair: RepairEngine::new(),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Primary entry point. CPU-bound; never awaits.
    pub async fn parse(&self, text: &str, context: Option<&ParseContext>) -> ParsingResult {
        self.parse_inner(text, context)
    }

    /// Best-effort synchronous variant: the calls on success, an empty
    /// list on any failure.
    pub fn parse_sync(&self, text: &str) -> Vec<NormalizedToolCall> {
        match self.parse_inner(text, None) {
            ParsingResult::Success { calls, .. } => calls,
            ParsingResult::Failure { .. } => Vec::new(),
        }
    }

    /// Would `parse` yield at least one call? No side effects.
    pub fn can_parse(&self, text: &str) -> bool {
        self.has_tool_content(text) && self.parse_inner(text, None).is_success()
    }

    /// Cheap pre-check: anything in the text that could open a JSON
    /// value or a fenced block.
    pub fn has_tool_content(&self, text: &str) -> bool {
        text.contains('{') || text.contains('[') || text.contains("```")
    }

    pub(crate) fn parse_inner(&self, text: &str, context: Option<&ParseContext>) -> ParsingResult {
        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.timeout_ms);
        let known_issues: &[KnownIssue] =
            context.map(|c| c.known_issues.as_slice()).unwrap_or(&[]);
        let mut fallback_level = context.map(|c| c.fallback_level).unwrap_or(0);

        let mut snippet: String = text.chars().take(self.config.max_snippet_length).collect();
        if text.chars().count() > self.config.max_snippet_length {
            snippet.push('…');
        }

        // Primary pass.
        let primary = self.run_stage(&self.extractor, text, known_issues);
        let mut found_any_candidates = primary.found_candidates;
        let mut last_errors = primary.errors.clone();
        let mut applied_repairs = primary.repairs.clone();
        if !primary.calls.is_empty() {
            return self.success(primary, None, 1.0, started, snippet);
        }

        if let Some(failure) = self.deadline_failure(started, deadline, &snippet) {
            return failure;
        }

        // Stage A: repair the full raw text and retry.
        if self.config.attempt_repairs {
            fallback_level += 1;
            let outcome = self
                .repair
                .repair(text, known_issues, self.config.max_repair_attempts);
            if !outcome.applied.is_empty() {
                debug!("auto_repair applied rules: {:?}", outcome.applied);
                let mut stage = self.run_stage(&self.extractor, &outcome.text, known_issues);
                found_any_candidates |= stage.found_candidates;
                stage.repairs = merge_labels(outcome.applied.clone(), stage.repairs);
                if !stage.calls.is_empty() {
                    return self.success(stage, Some("auto_repair"), 0.8, started, snippet);
                }
                if !stage.errors.is_empty() {
                    last_errors = stage.errors;
                }
                applied_repairs = merge_labels(applied_repairs, outcome.applied);
            }
        }

        if let Some(failure) = self.deadline_failure(started, deadline, &snippet) {
            return failure;
        }

        // Stage B: lenient extraction with a wider net.
        if self.config.use_fallbacks {
            fallback_level += 1;
            let stage = self.run_stage(&self.lenient_extractor, text, known_issues);
            found_any_candidates |= stage.found_candidates;
            if !stage.calls.is_empty() {
                return self.success(stage, Some("lenient_extraction"), 0.6, started, snippet);
            }
            if !stage.errors.is_empty() {
                last_errors = stage.errors;
            }
        }
        debug!("parse exhausted {} fallback stage(s)", fallback_level);

        self.failure(
            text,
            found_any_candidates,
            last_errors,
            applied_repairs,
            known_issues,
            started,
            snippet,
        )
    }

    /// One extraction + selection + normalization pass.
    fn run_stage(
        &self,
        extractor: &Extractor,
        text: &str,
        known_issues: &[KnownIssue],
    ) -> StageResult {
        let mut candidates = extractor.extract(text, known_issues);
        if !self.config.allow_partial {
            candidates.retain(|c| {
                c.method != ExtractionMethod::RegexPartial
                    && !c.repairs.iter().any(|r| r == TRUNCATION_LABEL)
            });
        }
        let mut result = StageResult {
            calls: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            method: None,
            format: None,
            confidence: 0.0,
            repairs: Vec::new(),
            found_candidates: !candidates.is_empty(),
        };
        let Some((index, selection)) = extractor.select_best(&candidates) else {
            return result;
        };
        let candidate = &candidates[index];
        debug!(
            "selected candidate: {} ({} alternatives)",
            selection.reason, selection.alternatives
        );
        self.normalize_candidate(candidate, text, &mut result);
        result
    }

    /// Detection runs over the whole stage text so fence markers count;
    /// extraction then works from the candidate value (or re-scans the
    /// text, for fenced output).
    fn normalize_candidate(
        &self,
        candidate: &ExtractionResult,
        text: &str,
        result: &mut StageResult,
    ) {
        let detected = self.detector.detect(text, &candidate.value);
        let raw_calls = self
            .detector
            .extract_raw_calls(detected.format, &candidate.value, text);

        result.method = Some(candidate.method);
        result.format = Some(detected.format);
        result.confidence = candidate.confidence;
        result.repairs = candidate.repairs.clone();

        for raw in &raw_calls {
            let outcome = self.validator.validate(
                raw,
                &self.registry,
                detected.format,
                Some(candidate.method),
                candidate.confidence,
            );
            result.errors.extend(outcome.errors);
            result.warnings.extend(outcome.warnings);
            if let Some(call) = outcome.call {
                result.calls.push(call);
            }
        }
    }

    fn success(
        &self,
        mut stage: StageResult,
        strategy: Option<&str>,
        multiplier: f64,
        started: Instant,
        snippet: String,
    ) -> ParsingResult {
        for call in &mut stage.calls {
            call.confidence = clamp_confidence(call.confidence * multiplier);
        }
        let mut warnings = stage.warnings;
        if stage.repairs.iter().any(|r| r == TRUNCATION_LABEL) {
            warnings.push(ValidationWarning::new(
                Vec::new(),
                "parsed from incomplete JSON",
            ));
        }
        let coercions = stage
            .calls
            .iter()
            .flat_map(|c| c.metadata.coercions.clone())
            .collect();
        ParsingResult::Success {
            metadata: ParseMetadata {
                parse_time_ms: started.elapsed().as_millis() as u64,
                extraction_method: stage.method,
                format: stage.format,
                confidence: clamp_confidence(stage.confidence * multiplier),
                coercions,
                warnings,
                raw_snippet: snippet,
                fallback_strategy: strategy.map(|s| s.to_string()),
                repairs: stage.repairs,
            },
            calls: stage.calls,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn failure(
        &self,
        text: &str,
        found_candidates: bool,
        errors: Vec<ValidationError>,
        applied_repairs: Vec<String>,
        known_issues: &[KnownIssue],
        started: Instant,
        snippet: String,
    ) -> ParsingResult {
        let error = if !found_candidates {
            "no JSON content found in model output".to_string()
        } else if let Some(first) = errors.first() {
            first.message.clone()
        } else {
            "no valid tool calls in model output".to_string()
        };

        let mut suggestions: Vec<String> = Vec::new();
        if !applied_repairs.is_empty() {
            suggestions.push(format!("repairs attempted: {}", applied_repairs.join(", ")));
        }
        for e in &errors {
            if let Some(s) = &e.suggestion {
                if !suggestions.contains(s) {
                    suggestions.push(s.clone());
                }
            }
        }
        if !found_candidates {
            suggestions
                .push("prompt the model to emit a single JSON object tool call".to_string());
        }
        suggestions.push(format!(
            "registered tools: {}",
            self.registry.tool_names().join(", ")
        ));

        let partial_calls = self.best_guess_partial(text, known_issues);
        ParsingResult::Failure {
            error,
            errors,
            suggestions,
            partial_calls,
            metadata: ParseMetadata {
                parse_time_ms: started.elapsed().as_millis() as u64,
                raw_snippet: snippet,
                ..Default::default()
            },
        }
    }

    /// One best-guess call at confidence 0.1, when any candidate looks
    /// like a tool call at all.
    fn best_guess_partial(
        &self,
        text: &str,
        known_issues: &[KnownIssue],
    ) -> Vec<NormalizedToolCall> {
        if !self.config.allow_partial {
            return Vec::new();
        }
        let candidates = self.lenient_extractor.extract(text, known_issues);
        for candidate in &candidates {
            let detected = self.detector.detect(&candidate.source, &candidate.value);
            let raw_calls = self.detector.extract_raw_calls(
                detected.format,
                &candidate.value,
                &candidate.source,
            );
            let Some(raw) = raw_calls.into_iter().next() else {
                continue;
            };
            let Some(name) = raw.tool.clone() else { continue };
            // Canonicalize when possible; otherwise carry the raw name.
            let tool = fuzzy::resolve_tool(
                &name,
                &self.registry,
                self.config.fuzzy_match_threshold,
                self.config.fuzzy_tool_matching,
            )
            .map(|m| m.name)
            .unwrap_or(name);
            return vec![NormalizedToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                tool,
                parameters: raw.parameters.clone(),
                confidence: 0.1,
                format: detected.format,
                raw,
                metadata: CallMetadata {
                    source_format: detected.format,
                    extraction_method: Some(ExtractionMethod::RegexPartial),
                    fuzzy_match: None,
                    parameter_mappings: Vec::new(),
                    coercions: Vec::new(),
                    timestamp: chrono::Utc::now(),
                },
            }];
        }
        Vec::new()
    }

    fn deadline_failure(
        &self,
        started: Instant,
        deadline: Duration,
        snippet: &str,
    ) -> Option<ParsingResult> {
        if started.elapsed() <= deadline {
            return None;
        }
        Some(ParsingResult::Failure {
            error: format!("parsing timed out after {}ms", self.config.timeout_ms),
            errors: Vec::new(),
            suggestions: vec![
                "increase timeout_ms or reduce the input size".to_string(),
            ],
            partial_calls: Vec::new(),
            metadata: ParseMetadata {
                parse_time_ms: started.elapsed().as_millis() as u64,
                raw_snippet: snippet.to_string(),
                ..Default::default()
            },
        })
    }
}

fn merge_labels(mut base: Vec<String>, extra: Vec<String>) -> Vec<String> {
    for label in extra {
        if !base.contains(&label) {
            base.push(label);
        }
    }
    base
}
