//! Repair Ladder Tests
//!
//! Exercises the fallback stages through the public API: auto_repair
//! over the full text, lenient extraction, known-issue packs, and the
//! strict-JSON no-op guarantee.

mod common;

use common::{default_parser, parser_with};
use tool_normalizer::{
    KnownIssue, ModelFamily, ParseContext, ParserConfig, ParsingResult,
};

#[tokio::test]
async fn test_strict_json_needs_no_repairs() {
    let parser = default_parser();
    let result = parser
        .parse(r#"{"tool": "move", "params": {"x": 1, "y": 2}}"#, None)
        .await;

    let ParsingResult::Success { metadata, .. } = result else {
        panic!("expected success");
    };
    assert!(metadata.repairs.is_empty());
    assert!(metadata.fallback_strategy.is_none());
}

#[tokio::test]
async fn test_auto_repair_missing_comma() {
    let parser = default_parser();
    let result = parser
        .parse(r#"{"tool": "move" "params": {"x": 1, "y": 2}}"#, None)
        .await;

    let ParsingResult::Success { calls, metadata } = result else {
        panic!("expected success");
    };
    assert_eq!(calls[0].tool, "move");
    assert_eq!(metadata.fallback_strategy.as_deref(), Some("auto_repair"));
    assert!(metadata
        .repairs
        .contains(&"missing_comma_after_value".to_string()));
}

#[tokio::test]
async fn test_known_issue_pack_applied_first() {
    let parser = default_parser();
    let context = ParseContext {
        known_issues: vec![KnownIssue::new("=>", ":", "arrow_colons")],
        ..Default::default()
    };
    let result = parser
        .parse(
            r#"{"tool" => "move", "params" => {"x": 1, "y": 2}}"#,
            Some(&context),
        )
        .await;

    let ParsingResult::Success { calls, metadata } = result else {
        panic!("expected success");
    };
    assert_eq!(calls[0].tool, "move");
    assert!(metadata.repairs.contains(&"arrow_colons".to_string()));
}

#[tokio::test]
async fn test_model_family_pack() {
    let parser = default_parser();
    let context = ParseContext::for_model(ModelFamily::Qwen);
    let result = parser
        .parse(
            "<tool_call>\n{\"tool\": \"move\", \"params\": {\"x\": 1, \"y\": 2}}\n</tool_call>",
            Some(&context),
        )
        .await;

    let ParsingResult::Success { calls, .. } = result else {
        panic!("expected success");
    };
    assert_eq!(calls[0].tool, "move");
}

#[tokio::test]
async fn test_lenient_extraction_stage() {
    // With stage A disabled, only the lenient extractor's span repair
    // can recover the input, at a steeper confidence discount.
    let config = ParserConfig {
        attempt_repairs: false,
        ..Default::default()
    };
    let parser = parser_with(config);
    let result = parser
        .parse(r#"{"tool": "move" "params": {"x": 1, "y": 2}}"#, None)
        .await;

    let ParsingResult::Success { calls, metadata } = result else {
        panic!("expected success");
    };
    assert_eq!(calls[0].tool, "move");
    assert_eq!(
        metadata.fallback_strategy.as_deref(),
        Some("lenient_extraction")
    );
    assert!(metadata.confidence <= 0.6);
}

#[tokio::test]
async fn test_ladder_fully_disabled_fails() {
    let config = ParserConfig {
        attempt_repairs: false,
        use_fallbacks: false,
        ..Default::default()
    };
    let parser = parser_with(config);
    let result = parser
        .parse(r#"{"tool": "move" "params": {"x": 1, "y": 2}}"#, None)
        .await;
    assert!(!result.is_success());
}

#[tokio::test]
async fn test_strict_mode_rejects_unknown_parameter() {
    let parser = parser_with(ParserConfig::strict());
    let result = parser
        .parse(
            r#"{"tool": "move", "params": {"x": 1, "y": 2, "zq_bogus": 5}}"#,
            None,
        )
        .await;
    assert!(!result.is_success());
}

#[tokio::test]
async fn test_lenient_mode_passes_unknown_parameter_through() {
    let parser = default_parser();
    let result = parser
        .parse(
            r#"{"tool": "move", "params": {"x": 1, "y": 2, "zq_bogus": 5}}"#,
            None,
        )
        .await;

    let ParsingResult::Success { calls, metadata } = result else {
        panic!("expected success");
    };
    assert_eq!(calls[0].parameters["zq_bogus"], 5);
    assert!(metadata
        .warnings
        .iter()
        .any(|w| w.message.contains("zq_bogus")));
}

#[tokio::test]
async fn test_comment_laden_output() {
    let config = ParserConfig {
        enable_json5: false,
        ..Default::default()
    };
    let parser = parser_with(config);
    let input = "{\n  \"tool\": \"move\", // the tool to run\n  \"params\": {\"x\": 1, \"y\": 2}\n}";
    let result = parser.parse(input, None).await;

    let ParsingResult::Success { calls, metadata } = result else {
        panic!("expected success");
    };
    assert_eq!(calls[0].tool, "move");
    assert!(metadata
        .repairs
        .contains(&"remove_comments_single".to_string()));
}

#[tokio::test]
async fn test_failure_suggestions_list_registered_tools() {
    let parser = default_parser();
    let result = parser.parse("nothing remotely json-like", None).await;

    let ParsingResult::Failure { suggestions, .. } = result else {
        panic!("expected failure");
    };
    assert!(suggestions.iter().any(|s| s.contains("move")));
}
