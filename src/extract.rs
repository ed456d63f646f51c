//! Multi-strategy extraction of candidate JSON values from raw text.
//!
//! Each strategy contributes candidates independently; identical spans
//! are deduplicated first-wins, low-confidence candidates are dropped,
//! and `select_best` ranks what remains.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::config::KnownIssue;
use crate::json5;
use crate::repair::{close_truncated, RepairEngine};
use crate::types::{clamp_confidence, ExtractionMethod, ExtractionResult};

/// Why a candidate was chosen over the alternatives.
#[derive(Debug, Clone)]
pub struct Selection {
    pub score: f64,
    pub alternatives: usize,
    pub reason: String,
}

pub struct Extractor {
    methods: Vec<ExtractionMethod>,
    min_confidence: f64,
    max_candidates: usize,
    enable_repair: bool,
    enable_json5: bool,
    max_repair_attempts: usize,
    fence: Regex,
    inline_probe: Regex,
    full_json: Regex,
    partial_probe: Regex,
    repair: RepairEngine,
}

/// Inputs small enough for the shallow full-JSON regex shortcut.
const FULL_JSON_MAX_LEN: usize = 512;

impl Extractor {
    pub fn new(
        methods: Vec<ExtractionMethod>,
        min_confidence: f64,
        max_candidates: usize,
        enable_repair: bool,
        enable_json5: bool,
        max_repair_attempts: usize,
    ) -> Self {
        Self {
            methods,
            min_confidence,
            max_candidates,
            enable_repair,
            enable_json5,
            max_repair_attempts,
            fence: Regex::new(r"```(?:json5?|javascript|js)?[ \t]*\r?\n?([\s\S]*?)```").unwrap(),
            inline_probe: Regex::new(r#"\{\s*"(?:tool|name|function|action)"\s*:\s*""#).unwrap(),
            full_json: Regex::new(
                r#"\{(?:[^{}"]|"(?:[^"\\]|\\.)*"|\{[^{}]*\})*\}|\[(?:[^\[\]"]|"(?:[^"\\]|\\.)*"|\[[^\[\]]*\])*\]"#,
            )
            .unwrap(),
            partial_probe: Regex::new(r#"\{\s*""#).unwrap(),
            repair: RepairEngine::new(),
        }
    }

    /// Strict JSON, then JSON5 when the relaxed grammar is enabled.
    fn parse_candidate(&self, text: &str) -> crate::errors::ParserResult<Value> {
        if self.enable_json5 {
            json5::parse_relaxed(text)
        } else {
            serde_json::from_str(text)
                .map_err(|e| crate::errors::ParserError::ParsingFailed(e.to_string()))
        }
    }

    /// Run every enabled strategy and return deduplicated, filtered,
    /// capped candidates in discovery order.
    pub fn extract(&self, text: &str, known_issues: &[KnownIssue]) -> Vec<ExtractionResult> {
        let mut candidates: Vec<ExtractionResult> = Vec::new();

        for method in &self.methods {
            match method {
                ExtractionMethod::MarkdownCodeblock => {
                    self.extract_markdown(text, known_issues, &mut candidates)
                }
                ExtractionMethod::AstBalanced => {
                    self.extract_balanced(text, false, &mut candidates)
                }
                ExtractionMethod::Json5Parse => {
                    if self.enable_json5 {
                        self.extract_balanced(text, true, &mut candidates)
                    }
                }
                ExtractionMethod::RegexFullJson => self.extract_full_regex(text, &mut candidates),
                ExtractionMethod::InlineJson => self.extract_inline(text, &mut candidates),
                ExtractionMethod::RegexPartial => self.extract_partial(text, &mut candidates),
                ExtractionMethod::Repaired => {}
            }
        }
        if self.enable_repair {
            self.extract_repaired(text, known_issues, &mut candidates);
        }

        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut out = Vec::new();
        for candidate in candidates {
            if candidate.confidence < self.min_confidence {
                continue;
            }
            if seen.insert((candidate.start, candidate.end)) {
                out.push(candidate);
            }
            if out.len() >= self.max_candidates {
                break;
            }
        }
        out
    }

    /// Score candidates and pick a winner. Ties go to the earlier
    /// offset; the returned index points into `candidates`.
    pub fn select_best(&self, candidates: &[ExtractionResult]) -> Option<(usize, Selection)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in candidates.iter().enumerate() {
            let score = score_candidate(candidate);
            let better = match best {
                None => true,
                Some((best_i, best_score)) => {
                    score > best_score
                        || (score == best_score && candidate.start < candidates[best_i].start)
                }
            };
            if better {
                best = Some((i, score));
            }
        }
        best.map(|(i, score)| {
            let candidate = &candidates[i];
            let mut reason = format!(
                "method {} at offset {} scored {:.2}",
                candidate.method.as_str(),
                candidate.start,
                score
            );
            if looks_like_tool_call(&candidate.value) {
                reason.push_str(", tool-call shape");
            }
            if !candidate.repairs.is_empty() {
                reason.push_str(", repaired");
            }
            (
                i,
                Selection {
                    score,
                    alternatives: candidates.len().saturating_sub(1),
                    reason,
                },
            )
        })
    }

    fn extract_markdown(
        &self,
        text: &str,
        known_issues: &[KnownIssue],
        out: &mut Vec<ExtractionResult>,
    ) {
        for caps in self.fence.captures_iter(text) {
            let Some(body) = caps.get(1) else { continue };
            let raw = body.as_str();
            if raw.trim().is_empty() {
                continue;
            }
            let parsed = match self.parse_candidate(raw.trim()) {
                Ok(value) => Some((value, Vec::new(), 1.0)),
                Err(e) => {
                    debug!("Markdown block parse failed: {}", e);
                    if self.enable_repair {
                        let outcome =
                            self.repair
                                .repair(raw.trim(), known_issues, self.max_repair_attempts);
                        if outcome.success {
                            serde_json::from_str(&outcome.text)
                                .ok()
                                .map(|value| (value, outcome.applied, 0.9))
                        } else {
                            None
                        }
                    } else {
                        None
                    }
                }
            };
            if let Some((value, repairs, factor)) = parsed {
                out.push(ExtractionResult {
                    value,
                    source: raw.to_string(),
                    start: body.start(),
                    end: body.end(),
                    method: ExtractionMethod::MarkdownCodeblock,
                    confidence: clamp_confidence(
                        ExtractionMethod::MarkdownCodeblock.base_confidence() * factor,
                    ),
                    repairs,
                    errors: Vec::new(),
                });
            }
        }
    }

    /// Balanced-bracket scan. With `json5_pass` false, only strict JSON
    /// spans are emitted; with it true, spans that parse only under the
    /// relaxed grammar are emitted as `json5_parse` candidates.
    fn extract_balanced(&self, text: &str, json5_pass: bool, out: &mut Vec<ExtractionResult>) {
        let bytes = text.as_bytes();
        let mut emitted = 0usize;
        for (start, &b) in bytes.iter().enumerate() {
            if b != b'{' && b != b'[' {
                continue;
            }
            if emitted >= self.max_candidates {
                break;
            }
            let Some(end) = walk_balanced(text, start) else {
                continue;
            };
            let span = &text[start..end];
            if json5_pass {
                if serde_json::from_str::<Value>(span).is_ok() {
                    continue; // strict pass already covers this span
                }
                if let Ok(value) = json5::parse_json5(span) {
                    out.push(ExtractionResult {
                        value,
                        source: span.to_string(),
                        start,
                        end,
                        method: ExtractionMethod::Json5Parse,
                        confidence: ExtractionMethod::Json5Parse.base_confidence(),
                        repairs: Vec::new(),
                        errors: Vec::new(),
                    });
                    emitted += 1;
                }
            } else if let Ok(value) = serde_json::from_str::<Value>(span) {
                out.push(ExtractionResult {
                    value,
                    source: span.to_string(),
                    start,
                    end,
                    method: ExtractionMethod::AstBalanced,
                    confidence: ExtractionMethod::AstBalanced.base_confidence(),
                    repairs: Vec::new(),
                    errors: Vec::new(),
                });
                emitted += 1;
            }
        }
    }

    fn extract_full_regex(&self, text: &str, out: &mut Vec<ExtractionResult>) {
        if text.len() > FULL_JSON_MAX_LEN {
            return;
        }
        for m in self.full_json.find_iter(text) {
            if let Ok(value) = serde_json::from_str::<Value>(m.as_str()) {
                out.push(ExtractionResult {
                    value,
                    source: m.as_str().to_string(),
                    start: m.start(),
                    end: m.end(),
                    method: ExtractionMethod::RegexFullJson,
                    confidence: ExtractionMethod::RegexFullJson.base_confidence(),
                    repairs: Vec::new(),
                    errors: Vec::new(),
                });
            }
        }
    }

    fn extract_inline(&self, text: &str, out: &mut Vec<ExtractionResult>) {
        for m in self.inline_probe.find_iter(text) {
            let start = m.start();
            let Some(end) = walk_balanced(text, start) else {
                continue;
            };
            let span = &text[start..end];
            let value = match self.parse_candidate(span) {
                Ok(value) => value,
                Err(_) => continue,
            };
            out.push(ExtractionResult {
                value,
                source: span.to_string(),
                start,
                end,
                method: ExtractionMethod::InlineJson,
                confidence: ExtractionMethod::InlineJson.base_confidence(),
                repairs: Vec::new(),
                errors: Vec::new(),
            });
        }
    }

    /// Unterminated object probe: a `{"` with no balancing close gets a
    /// truncation closure and a low-confidence candidate.
    fn extract_partial(&self, text: &str, out: &mut Vec<ExtractionResult>) {
        for m in self.partial_probe.find_iter(text) {
            let start = m.start();
            if walk_balanced(text, start).is_some() {
                continue;
            }
            let tail = &text[start..];
            let Some(closed) = close_truncated(tail) else {
                continue;
            };
            if let Ok(value) = serde_json::from_str::<Value>(&closed) {
                out.push(ExtractionResult {
                    value,
                    source: tail.to_string(),
                    start,
                    end: text.len(),
                    method: ExtractionMethod::RegexPartial,
                    confidence: ExtractionMethod::RegexPartial.base_confidence(),
                    repairs: vec![crate::repair::TRUNCATION_LABEL.to_string()],
                    errors: Vec::new(),
                });
            }
            break; // earliest unterminated probe is the best guess
        }
    }

    /// Outermost-span repair pass with the caller's model pack.
    fn extract_repaired(
        &self,
        text: &str,
        known_issues: &[KnownIssue],
        out: &mut Vec<ExtractionResult>,
    ) {
        let Some(start) = text.find(['{', '[']) else {
            return;
        };
        let end = text.rfind(['}', ']']).map(|i| i + 1).unwrap_or(text.len());
        if end <= start {
            return;
        }
        let span = &text[start..end];
        let outcome = self.repair.repair(span, known_issues, self.max_repair_attempts);
        if !outcome.success {
            return;
        }
        let Ok(value) = serde_json::from_str::<Value>(&outcome.text) else {
            return;
        };
        out.push(ExtractionResult {
            value,
            source: span.to_string(),
            start,
            end,
            method: ExtractionMethod::Repaired,
            confidence: ExtractionMethod::Repaired.base_confidence(),
            repairs: outcome.applied,
            errors: Vec::new(),
        });
    }
}

/// Candidate score: base confidence, bumped for tool-call shape and
/// clean (unrepaired) parses, docked per recorded error and for late
/// position in the document.
fn score_candidate(candidate: &ExtractionResult) -> f64 {
    let mut score = candidate.confidence;
    if looks_like_tool_call(&candidate.value) {
        score += 0.10;
    }
    if candidate.repairs.is_empty() {
        score += 0.05;
    }
    score -= 0.10 * candidate.errors.len() as f64;
    score -= 0.05 * (candidate.start as f64 / 10_000.0).min(1.0);
    clamp_confidence(score)
}

/// Keys whose presence marks an object as a plausible tool call.
const TOOL_CALL_KEYS: &[&str] = &[
    "tool",
    "name",
    "function",
    "actions",
    "commands",
    "tools",
    "tool_calls",
    "choices",
];

/// Structural probe for tool-call shape: a keyed object, an array with
/// any matching element, or a Claude-style `content` array of typed
/// blocks.
pub fn looks_like_tool_call(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            if TOOL_CALL_KEYS.iter().any(|k| map.contains_key(*k)) {
                return true;
            }
            if let Some(Value::Array(content)) = map.get("content") {
                return content
                    .iter()
                    .any(|item| item.as_object().is_some_and(|o| o.contains_key("type")));
            }
            false
        }
        Value::Array(items) => items.iter().any(looks_like_tool_call),
        _ => false,
    }
}

/// From an opening `{`/`[` at `start`, walk forward tracking depth,
/// string state, and escapes; returns the byte offset one past the
/// close that returns depth to zero.
pub fn walk_balanced(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let open = *bytes.get(start)?;
    if open != b'{' && open != b'[' {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if b == b'\\' {
                escape_next = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            b'"' => in_string = true,
            _ => {}
        }
    }
    None
}
