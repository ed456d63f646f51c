//! Deterministic JSON repair pipeline.
//!
//! Applies an ordered sequence of local rewrites to a malformed
//! candidate until a strict JSON parse succeeds or the rules are
//! exhausted, then attempts structural completion of truncated input.
//! Caller-supplied model-specific rules run before the generic ones.
//!
//! Rules run in descending priority, ties broken by name. Every rule is
//! a local text rewrite; none of them aborts the pipeline on failure.

use regex::Regex;
use tracing::debug;

use crate::config::KnownIssue;

/// Result of one repair pipeline run. `success` means the final text
/// parses under strict JSON.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub success: bool,
    pub text: String,
    /// Labels of rules that changed the text, in application order.
    pub applied: Vec<String>,
    /// Soft errors (bad caller-supplied patterns etc.); never fatal.
    pub errors: Vec<String>,
}

/// Label recorded when the truncation-closure stage changed the text.
pub const TRUNCATION_LABEL: &str = "truncation_closure";

/// Generic repair rules with pre-compiled patterns.
pub struct RepairEngine {
    python_true: Regex,
    python_false: Regex,
    python_none: Regex,
    single_quoted: Regex,
    unquoted_key: Regex,
    trailing_comma_object: Regex,
    trailing_comma_array: Regex,
    comma_between_properties: Regex,
    comma_after_value: Regex,
    comma_after_brace: Regex,
    nan_infinity: Regex,
    undefined: Regex,
    comment_single: Regex,
    comment_multi: Regex,
    blank_lines: Regex,
}

/// Rule names in execution order: descending priority, ties by name.
const RULE_ORDER: &[&str] = &[
    "python_booleans",              // 100
    "single_quotes",                // 95
    "unquoted_keys",                // 90
    "trailing_comma_array",         // 85
    "trailing_comma_object",        // 85
    "missing_comma_between_properties", // 80
    "missing_comma_after_value",    // 75
    "missing_comma_after_brace",    // 70
    "nan_infinity",                 // 60
    "undefined_to_null",            // 60
    "remove_comments_multi",        // 50
    "remove_comments_single",       // 50
    "normalize_whitespace",         // 10
];

impl RepairEngine {
    pub fn new() -> Self {
        Self {
            python_true: Regex::new(r"\bTrue\b").unwrap(),
            python_false: Regex::new(r"\bFalse\b").unwrap(),
            python_none: Regex::new(r"\bNone\b").unwrap(),
            single_quoted: Regex::new(r"'((?:[^'\\]|\\.)*)'").unwrap(),
            unquoted_key: Regex::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)\s*:").unwrap(),
            trailing_comma_object: Regex::new(r",(\s*)\}").unwrap(),
            trailing_comma_array: Regex::new(r",(\s*)\]").unwrap(),
            comma_between_properties: Regex::new("\"[ \\t]*\\n(\\s*)\"").unwrap(),
            comma_after_value: Regex::new(r#"(\d|\btrue|\bfalse|\bnull|")([ \t]+)""#).unwrap(),
            comma_after_brace: Regex::new(r"([}\]])\s*([{\[])").unwrap(),
            nan_infinity: Regex::new(r"-?\bInfinity\b|\bNaN\b").unwrap(),
            undefined: Regex::new(r"\bundefined\b").unwrap(),
            comment_single: Regex::new(r"//[^\n]*").unwrap(),
            comment_multi: Regex::new(r"/\*[\s\S]*?\*/").unwrap(),
            blank_lines: Regex::new(r"\n{3,}").unwrap(),
        }
    }

    /// Run the full pipeline: model pack, generic rules (bounded by
    /// `max_attempts` passes), then truncation closure.
    pub fn repair(
        &self,
        input: &str,
        known_issues: &[KnownIssue],
        max_attempts: usize,
    ) -> RepairOutcome {
        let mut outcome = RepairOutcome {
            success: false,
            text: input.to_string(),
            applied: Vec::new(),
            errors: Vec::new(),
        };

        if serde_json::from_str::<serde_json::Value>(input).is_ok() {
            outcome.success = true;
            return outcome;
        }

        // Model-specific rules first.
        for issue in known_issues {
            match Regex::new(&issue.pattern) {
                Ok(re) => {
                    let fixed = re.replace_all(&outcome.text, issue.replacement.as_str());
                    if fixed != outcome.text {
                        outcome.text = fixed.into_owned();
                        record(&mut outcome.applied, &issue.label);
                        if parses(&outcome.text) {
                            outcome.success = true;
                            return outcome;
                        }
                    }
                }
                Err(e) => {
                    debug!("Skipping malformed known-issue pattern {:?}: {}", issue.label, e);
                    outcome.errors.push(format!("{}: {}", issue.label, e));
                }
            }
        }

        for _ in 0..max_attempts.max(1) {
            let mut changed_any = false;
            for name in RULE_ORDER {
                let fixed = self.apply_rule(name, &outcome.text);
                if fixed != outcome.text {
                    outcome.text = fixed;
                    changed_any = true;
                    record(&mut outcome.applied, name);
                    if parses(&outcome.text) {
                        outcome.success = true;
                        return outcome;
                    }
                }
            }
            if !changed_any {
                break;
            }
        }

        // Second stage: close truncated structures.
        if let Some(closed) = close_truncated(&outcome.text) {
            outcome.text = closed;
            record(&mut outcome.applied, TRUNCATION_LABEL);
            if parses(&outcome.text) {
                outcome.success = true;
                return outcome;
            }
        }

        outcome
    }

    fn apply_rule(&self, name: &str, text: &str) -> String {
        match name {
            "python_booleans" => {
                let t = self.python_true.replace_all(text, "true");
                let t = self.python_false.replace_all(&t, "false");
                self.python_none.replace_all(&t, "null").into_owned()
            }
            "single_quotes" => self
                .single_quoted
                .replace_all(text, |caps: &regex::Captures| {
                    format!("\"{}\"", requote_single(&caps[1]))
                })
                .into_owned(),
            "unquoted_keys" => self
                .unquoted_key
                .replace_all(text, "$1\"$2\":")
                .into_owned(),
            "trailing_comma_array" => self
                .trailing_comma_array
                .replace_all(text, "$1]")
                .into_owned(),
            "trailing_comma_object" => self
                .trailing_comma_object
                .replace_all(text, "$1}")
                .into_owned(),
            "missing_comma_between_properties" => self
                .comma_between_properties
                .replace_all(text, "\",\n  \"")
                .into_owned(),
            "missing_comma_after_value" => self
                .comma_after_value
                .replace_all(text, "$1,$2\"")
                .into_owned(),
            "missing_comma_after_brace" => self
                .comma_after_brace
                .replace_all(text, "$1, $2")
                .into_owned(),
            "nan_infinity" => self.nan_infinity.replace_all(text, "null").into_owned(),
            "undefined_to_null" => self.undefined.replace_all(text, "null").into_owned(),
            "remove_comments_multi" => self.comment_multi.replace_all(text, "").into_owned(),
            "remove_comments_single" => self.comment_single.replace_all(text, "").into_owned(),
            "normalize_whitespace" => self.blank_lines.replace_all(text, "\n\n").into_owned(),
            _ => text.to_string(),
        }
    }
}

impl Default for RepairEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn parses(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text).is_ok()
}

fn record(applied: &mut Vec<String>, label: &str) {
    if !applied.iter().any(|a| a == label) {
        applied.push(label.to_string());
    }
}

/// Convert the interior of a single-quoted string for double quoting:
/// `\'` unescapes, bare `"` escapes, other escapes pass through.
fn requote_single(interior: &str) -> String {
    let mut out = String::with_capacity(interior.len());
    let mut chars = interior.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// Walk the text once tracking string state and a bracket stack; append
/// a closing quote and the matching closers (LIFO) for anything left
/// open. Returns `None` when the text needed no completion.
pub fn close_truncated(text: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in text.chars() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '{' | '[' => stack.push(c),
            '}' => {
                if stack.last() == Some(&'{') {
                    stack.pop();
                }
            }
            ']' => {
                if stack.last() == Some(&'[') {
                    stack.pop();
                }
            }
            '"' => in_string = true,
            _ => {}
        }
    }

    if !in_string && stack.is_empty() {
        return None;
    }

    let mut out = text.to_string();
    if in_string {
        out.push('"');
    }
    while let Some(open) = stack.pop() {
        out.push(if open == '{' { '}' } else { ']' });
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> RepairEngine {
        RepairEngine::new()
    }

    fn repaired(input: &str) -> RepairOutcome {
        engine().repair(input, &[], 3)
    }

    #[test]
    fn test_strict_json_is_noop() {
        let outcome = repaired(r#"{"tool": "move", "params": {"x": 1}}"#);
        assert!(outcome.success);
        assert!(outcome.applied.is_empty());
    }

    #[test]
    fn test_python_booleans() {
        let outcome = repaired(r#"{"active": True, "off": False, "nothing": None}"#);
        assert!(outcome.success);
        assert!(outcome.applied.contains(&"python_booleans".to_string()));
        let value: serde_json::Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(value, json!({"active": true, "off": false, "nothing": null}));
    }

    #[test]
    fn test_single_quotes_and_unquoted_keys() {
        let outcome = repaired(r#"{'tool': 'move', params: {x: 10, y: 20,},}"#);
        assert!(outcome.success);
        assert!(outcome.applied.contains(&"single_quotes".to_string()));
        assert!(outcome.applied.contains(&"unquoted_keys".to_string()));
        assert!(outcome.applied.contains(&"trailing_comma_object".to_string()));
        let value: serde_json::Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(value["params"]["y"], 20);
    }

    #[test]
    fn test_single_quote_interior_escapes() {
        let outcome = repaired(r#"{'text': 'it\'s "quoted"'}"#);
        assert!(outcome.success);
        let value: serde_json::Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(value["text"], "it's \"quoted\"");
    }

    #[test]
    fn test_trailing_commas() {
        let outcome = repaired(r#"{"a": [1, 2,],}"#);
        assert!(outcome.success);
        assert!(outcome.applied.contains(&"trailing_comma_array".to_string()));
    }

    #[test]
    fn test_missing_comma_between_properties() {
        let outcome = repaired("{\"a\": \"x\"\n\"b\": \"y\"}");
        assert!(outcome.success);
        assert!(outcome
            .applied
            .contains(&"missing_comma_between_properties".to_string()));
    }

    #[test]
    fn test_missing_comma_after_value() {
        let outcome = repaired(r#"{"a": 1 "b": 2}"#);
        assert!(outcome.success);
        assert!(outcome
            .applied
            .contains(&"missing_comma_after_value".to_string()));
    }

    #[test]
    fn test_missing_comma_after_brace() {
        let outcome = repaired(r#"[{"a": 1}{"b": 2}]"#);
        assert!(outcome.success);
        assert!(outcome
            .applied
            .contains(&"missing_comma_after_brace".to_string()));
    }

    #[test]
    fn test_nan_infinity_and_undefined() {
        let outcome = repaired(r#"{"a": NaN, "b": Infinity, "c": -Infinity, "d": undefined}"#);
        assert!(outcome.success);
        let value: serde_json::Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(value, json!({"a": null, "b": null, "c": null, "d": null}));
    }

    #[test]
    fn test_comments_removed() {
        let outcome = repaired("{\n  \"a\": 1, // count\n  /* block */ \"b\": 2\n}");
        assert!(outcome.success);
        assert!(outcome
            .applied
            .contains(&"remove_comments_single".to_string()));
    }

    #[test]
    fn test_truncation_closure() {
        let outcome = repaired(r#"{"tool": "move", "params": {"x": 10"#);
        assert!(outcome.success);
        assert!(outcome.applied.contains(&TRUNCATION_LABEL.to_string()));
        let value: serde_json::Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(value["params"]["x"], 10);
    }

    #[test]
    fn test_truncation_inside_string() {
        let outcome = repaired(r#"{"tool": "mo"#);
        assert!(outcome.success);
        let value: serde_json::Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(value["tool"], "mo");
    }

    #[test]
    fn test_known_issues_run_first() {
        let issues = vec![KnownIssue::new(
            r"</?tool_call>",
            "",
            "strip_tool_call_tags",
        )];
        let outcome = engine().repair(
            r#"<tool_call>{"tool": "move", "params": {}}</tool_call>"#,
            &issues,
            3,
        );
        assert!(outcome.success);
        assert_eq!(outcome.applied, vec!["strip_tool_call_tags".to_string()]);
    }

    #[test]
    fn test_bad_known_issue_pattern_is_soft_error() {
        let issues = vec![KnownIssue::new(r"([", "", "broken")];
        let outcome = engine().repair(r#"{"a": 1,}"#, &issues, 3);
        assert!(outcome.success);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_close_truncated_no_change() {
        assert!(close_truncated(r#"{"a": 1}"#).is_none());
    }

    #[test]
    fn test_mismatched_close_ignored() {
        // A stray `}` with no matching open must not underflow the stack.
        let closed = close_truncated(r#"} ["#).unwrap();
        assert!(closed.ends_with(']'));
    }
}
