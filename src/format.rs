//! Provider-family format detection and raw tool-call extraction.
//!
//! Detection runs text cues in a fixed priority order and returns the
//! first hit with its static confidence. Extraction then pulls the
//! embedded `{tool, parameters}` pairs out of the family's envelope,
//! preserving document order.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::json5;
use crate::types::{DetectedFormat, OutputFormat, RawToolCall};

pub struct FormatDetector {
    fence: Regex,
    claude: Regex,
    openai: Regex,
    gemini: Regex,
    ollama: Regex,
    custom: Regex,
}

impl FormatDetector {
    pub fn new() -> Self {
        Self {
            fence: Regex::new(r"```(?:json5?|javascript|js)?[ \t]*\r?\n?([\s\S]*?)```").unwrap(),
            claude: Regex::new(r#""type"\s*:\s*"tool_use""#).unwrap(),
            openai: Regex::new(
                r#""tool_calls"\s*:\s*\[|"function"\s*:\s*\{[^}]*"name"|"arguments"\s*:\s*"\{"#,
            )
            .unwrap(),
            gemini: Regex::new(r#""functionCall"\s*:\s*\{|"functionResponse"\s*:"#).unwrap(),
            ollama: Regex::new(r#""commands"\s*:\s*\[|"tool"\s*:\s*"|"thinking"\s*:"#).unwrap(),
            custom: Regex::new(r#""(?:actions|tools)"\s*:\s*\["#).unwrap(),
        }
    }

    /// Label a candidate with its provider family.
    pub fn detect(&self, text: &str, value: &Value) -> DetectedFormat {
        let (format, confidence) = if text.contains("```") {
            (OutputFormat::MarkdownJson, 0.80)
        } else if self.claude.is_match(text) {
            (OutputFormat::ClaudeToolUse, 0.95)
        } else if self.openai.is_match(text) {
            (OutputFormat::OpenaiFunctionCall, 0.95)
        } else if self.gemini.is_match(text) {
            (OutputFormat::GeminiFunctionCall, 0.90)
        } else if self.ollama.is_match(text) {
            (OutputFormat::OllamaJson, 0.85)
        } else if self.custom.is_match(text) {
            (OutputFormat::CustomStructured, 0.70)
        } else if value.is_object() {
            (OutputFormat::InlineJson, 0.60)
        } else {
            (OutputFormat::Unknown, 0.0)
        };
        DetectedFormat {
            format,
            confidence,
            version: None,
            metadata: Map::new(),
        }
    }

    /// Pull raw calls out of a detected envelope.
    pub fn extract_raw_calls(
        &self,
        format: OutputFormat,
        value: &Value,
        text: &str,
    ) -> Vec<RawToolCall> {
        match format {
            OutputFormat::ClaudeToolUse | OutputFormat::AnthropicBetaTools => {
                extract_claude(value)
            }
            OutputFormat::OpenaiFunctionCall => extract_openai(value),
            OutputFormat::OllamaJson | OutputFormat::QwenStructured | OutputFormat::LlamaJson => {
                extract_ollama(value)
            }
            OutputFormat::GeminiFunctionCall => extract_gemini(value),
            OutputFormat::CustomStructured | OutputFormat::InlineJson => extract_generic(value),
            OutputFormat::MarkdownJson => self.extract_markdown(text),
            OutputFormat::Unknown => extract_generic(value),
        }
    }

    /// Re-scan fenced blocks, parse each body, and recurse into the
    /// detected family. One level only; fences cannot nest.
    fn extract_markdown(&self, text: &str) -> Vec<RawToolCall> {
        let mut calls = Vec::new();
        for caps in self.fence.captures_iter(text) {
            let Some(body) = caps.get(1) else { continue };
            let body_text = body.as_str().trim();
            if body_text.is_empty() {
                continue;
            }
            let value = match json5::parse_relaxed(body_text) {
                Ok(value) => value,
                Err(e) => {
                    debug!("Skipping unparseable fenced block: {}", e);
                    continue;
                }
            };
            let detected = self.detect(body_text, &value);
            let inner = if detected.format == OutputFormat::MarkdownJson {
                extract_generic(&value)
            } else {
                self.extract_raw_calls(detected.format, &value, body_text)
            };
            calls.extend(inner);
        }
        calls
    }
}

impl Default for FormatDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Claude envelope: `content[]` blocks with `type == "tool_use"`, or a
/// bare `tool_use` block at the top level.
fn extract_claude(value: &Value) -> Vec<RawToolCall> {
    let mut calls = Vec::new();
    if let Some(content) = value.get("content").and_then(Value::as_array) {
        for block in content {
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                if let Some(call) = claude_block(block) {
                    calls.push(call);
                }
            }
        }
    }
    if value.get("type").and_then(Value::as_str) == Some("tool_use") {
        if let Some(call) = claude_block(value) {
            calls.push(call);
        }
    }
    calls
}

fn claude_block(block: &Value) -> Option<RawToolCall> {
    let name = block.get("name").and_then(Value::as_str)?;
    let parameters = block
        .get("input")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some(RawToolCall {
        tool: Some(name.to_string()),
        parameters,
    })
}

/// OpenAI envelope: `choices[].message.tool_calls[]` plus any top-level
/// `tool_calls[]`; `function.arguments` may arrive as a JSON string.
fn extract_openai(value: &Value) -> Vec<RawToolCall> {
    let mut calls = Vec::new();
    if let Some(choices) = value.get("choices").and_then(Value::as_array) {
        for choice in choices {
            if let Some(tool_calls) = choice
                .get("message")
                .and_then(|m| m.get("tool_calls"))
                .and_then(Value::as_array)
            {
                calls.extend(tool_calls.iter().filter_map(openai_item));
            }
        }
    }
    if let Some(tool_calls) = value.get("tool_calls").and_then(Value::as_array) {
        calls.extend(tool_calls.iter().filter_map(openai_item));
    }
    calls
}

fn openai_item(item: &Value) -> Option<RawToolCall> {
    let function = item.get("function")?;
    let name = function.get("name").and_then(Value::as_str)?;
    let parameters = match function.get("arguments") {
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default(),
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    Some(RawToolCall {
        tool: Some(name.to_string()),
        parameters,
    })
}

/// Ollama-style envelopes: a `commands[]` array and/or a bare call at
/// the top level, with `tool|name|action` and `params|parameters|args`.
fn extract_ollama(value: &Value) -> Vec<RawToolCall> {
    let mut calls = Vec::new();
    if let Value::Array(items) = value {
        return items.iter().filter_map(ollama_item).collect();
    }
    if let Some(commands) = value.get("commands").and_then(Value::as_array) {
        for command in commands {
            if let Some(call) = ollama_item(command) {
                calls.push(call);
            }
        }
    }
    if ["tool", "name", "action"]
        .iter()
        .any(|k| value.get(*k).is_some())
    {
        if let Some(call) = ollama_item(value) {
            calls.push(call);
        }
    }
    calls
}

fn ollama_item(item: &Value) -> Option<RawToolCall> {
    let name = ["tool", "name", "action"]
        .iter()
        .find_map(|k| item.get(*k))?;
    let name = name.as_str()?;
    let parameters = ["params", "parameters", "args"]
        .iter()
        .find_map(|k| item.get(*k))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some(RawToolCall {
        tool: Some(name.to_string()),
        parameters,
    })
}

/// Gemini envelope: top-level `functionCall{name,args}` plus any
/// `parts[].functionCall`.
fn extract_gemini(value: &Value) -> Vec<RawToolCall> {
    let mut calls = Vec::new();
    if let Some(call) = value.get("functionCall").and_then(gemini_item) {
        calls.push(call);
    }
    if let Some(parts) = value.get("parts").and_then(Value::as_array) {
        for part in parts {
            if let Some(call) = part.get("functionCall").and_then(gemini_item) {
                calls.push(call);
            }
        }
    }
    calls
}

fn gemini_item(function_call: &Value) -> Option<RawToolCall> {
    let name = function_call.get("name").and_then(Value::as_str)?;
    let parameters = function_call
        .get("args")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some(RawToolCall {
        tool: Some(name.to_string()),
        parameters,
    })
}

/// Keys that may hold an array of calls in loosely structured output.
const CALL_ARRAY_KEYS: &[&str] = &["actions", "tools", "commands", "calls", "operations"];

/// Custom/inline shapes: arrays of calls under known keys, an array at
/// the top level, or the object itself as one call.
fn extract_generic(value: &Value) -> Vec<RawToolCall> {
    if let Value::Array(items) = value {
        return items.iter().filter_map(single_call).collect();
    }
    for key in CALL_ARRAY_KEYS {
        if let Some(items) = value.get(*key).and_then(Value::as_array) {
            let calls: Vec<RawToolCall> = items.iter().filter_map(single_call).collect();
            if !calls.is_empty() {
                return calls;
            }
        }
    }
    single_call(value).into_iter().collect()
}

const NAME_KEYS: &[&str] = &["tool", "name", "function", "action", "type"];
const PARAM_KEYS: &[&str] = &["parameters", "params", "arguments", "args", "input"];

/// Read one call from a bare object: first present name key, first
/// present parameter key. Non-string tool names are rejected.
fn single_call(value: &Value) -> Option<RawToolCall> {
    let object = value.as_object()?;
    let name = NAME_KEYS.iter().find_map(|k| object.get(*k))?;
    let name = name.as_str()?;
    let parameters = PARAM_KEYS
        .iter()
        .find_map(|k| object.get(*k))
        .map(|v| match v {
            Value::Object(map) => map.clone(),
            Value::String(s) => serde_json::from_str::<Value>(s)
                .ok()
                .and_then(|parsed| parsed.as_object().cloned())
                .unwrap_or_default(),
            _ => Map::new(),
        })
        .unwrap_or_default();
    Some(RawToolCall {
        tool: Some(name.to_string()),
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detector() -> FormatDetector {
        FormatDetector::new()
    }

    #[test]
    fn test_detect_priority_order() {
        let d = detector();
        let obj = json!({});

        let claude = r#"{"content":[{"type":"tool_use","name":"move","input":{}}]}"#;
        assert_eq!(d.detect(claude, &obj).format, OutputFormat::ClaudeToolUse);
        assert_eq!(d.detect(claude, &obj).confidence, 0.95);

        // A fence wins over everything inside it.
        let fenced = format!("```json\n{claude}\n```");
        assert_eq!(d.detect(&fenced, &obj).format, OutputFormat::MarkdownJson);

        let openai = r#"{"tool_calls":[{"function":{"name":"move"}}]}"#;
        assert_eq!(
            d.detect(openai, &obj).format,
            OutputFormat::OpenaiFunctionCall
        );

        let gemini = r#"{"functionCall":{"name":"move"}}"#;
        assert_eq!(
            d.detect(gemini, &obj).format,
            OutputFormat::GeminiFunctionCall
        );

        let ollama = r#"{"tool":"move","params":{}}"#;
        assert_eq!(d.detect(ollama, &obj).format, OutputFormat::OllamaJson);

        let custom = r#"{"actions":[{"name":"move"}]}"#;
        assert_eq!(d.detect(custom, &obj).format, OutputFormat::CustomStructured);
    }

    #[test]
    fn test_detect_inline_and_unknown() {
        let d = detector();
        let detected = d.detect(r#"{"foo": 1}"#, &json!({"foo": 1}));
        assert_eq!(detected.format, OutputFormat::InlineJson);
        assert_eq!(detected.confidence, 0.60);

        let detected = d.detect("[1, 2]", &json!([1, 2]));
        assert_eq!(detected.format, OutputFormat::Unknown);
        assert_eq!(detected.confidence, 0.0);
    }

    #[test]
    fn test_extract_claude_content_array() {
        let value = json!({
            "content": [
                {"type": "text", "text": "ok"},
                {"type": "tool_use", "name": "create_rectangle", "input": {"x": 1}},
                {"type": "tool_use", "name": "set_fill_color", "input": {"color": "#3B82F6"}}
            ]
        });
        let calls = detector().extract_raw_calls(OutputFormat::ClaudeToolUse, &value, "");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool.as_deref(), Some("create_rectangle"));
        assert_eq!(calls[1].tool.as_deref(), Some("set_fill_color"));
        assert_eq!(calls[0].parameters["x"], 1);
    }

    #[test]
    fn test_extract_claude_top_level_block() {
        let value = json!({"type": "tool_use", "name": "move", "input": {"x": 4}});
        let calls = detector().extract_raw_calls(OutputFormat::ClaudeToolUse, &value, "");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool.as_deref(), Some("move"));
    }

    #[test]
    fn test_extract_openai_stringified_arguments() {
        let value = json!({
            "choices": [{"message": {"tool_calls": [
                {"function": {"name": "move", "arguments": "{\"x\": 7}"}}
            ]}}]
        });
        let calls = detector().extract_raw_calls(OutputFormat::OpenaiFunctionCall, &value, "");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters["x"], 7);
    }

    #[test]
    fn test_extract_openai_bad_arguments_fall_back_empty() {
        let value = json!({
            "tool_calls": [{"function": {"name": "move", "arguments": "{not json"}}]
        });
        let calls = detector().extract_raw_calls(OutputFormat::OpenaiFunctionCall, &value, "");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].parameters.is_empty());
    }

    #[test]
    fn test_extract_ollama_commands_and_top_level() {
        let value = json!({
            "commands": [
                {"tool": "move", "params": {"x": 1}},
                {"action": "set_fill_color", "args": {"color": "#fff"}}
            ]
        });
        let calls = detector().extract_raw_calls(OutputFormat::OllamaJson, &value, "");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].tool.as_deref(), Some("set_fill_color"));

        let top = json!({"tool": "move", "params": {"x": 2}});
        let calls = detector().extract_raw_calls(OutputFormat::OllamaJson, &top, "");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters["x"], 2);
    }

    #[test]
    fn test_extract_gemini() {
        let value = json!({
            "functionCall": {"name": "move", "args": {"x": 1}},
            "parts": [{"functionCall": {"name": "set_fill_color", "args": {}}}]
        });
        let calls = detector().extract_raw_calls(OutputFormat::GeminiFunctionCall, &value, "");
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn test_extract_custom_arrays() {
        let value = json!({"actions": [{"name": "move", "params": {"x": 1}}]});
        let calls = detector().extract_raw_calls(OutputFormat::CustomStructured, &value, "");
        assert_eq!(calls.len(), 1);

        let array = json!([{"tool": "move"}, {"tool": "set_fill_color"}]);
        let calls = detector().extract_raw_calls(OutputFormat::CustomStructured, &array, "");
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn test_single_call_rejects_non_string_name() {
        assert!(single_call(&json!({"tool": 42})).is_none());
        assert!(single_call(&json!({"note": "no name"})).is_none());
    }

    #[test]
    fn test_markdown_recursion() {
        let text = "Before\n```json\n{\"tool\": \"move\", \"params\": {\"x\": 1}}\n```\nAfter";
        let calls = detector().extract_raw_calls(OutputFormat::MarkdownJson, &json!({}), text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool.as_deref(), Some("move"));
    }
}
