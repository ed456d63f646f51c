//! Common test utilities for tool-normalizer tests

use std::sync::Arc;

use serde_json::json;
use tool_normalizer::{
    ParserConfig, PropertySchema, PropertyType, ToolCallParser, ToolRegistry, ToolSchema,
};

/// Registry with the default drawing tools used across the test suite.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(
        ToolSchema::new("create_rectangle", "Create a rectangle on the canvas")
            .with_property("x", PropertySchema::new(PropertyType::Number))
            .with_property("y", PropertySchema::new(PropertyType::Number))
            .with_property("width", PropertySchema::new(PropertyType::Number))
            .with_property("height", PropertySchema::new(PropertyType::Number))
            .with_property("color", PropertySchema::new(PropertyType::String))
            .with_required(&["x", "y", "width", "height"]),
    );
    registry.register(
        ToolSchema::new("set_fill_color", "Set the fill color of the selection")
            .with_property(
                "color",
                PropertySchema::new(PropertyType::String).with_pattern("^#[0-9A-Fa-f]{6}$"),
            )
            .with_property(
                "opacity",
                PropertySchema::new(PropertyType::Number)
                    .with_range(Some(0.0), Some(1.0))
                    .with_default(json!(1.0)),
            )
            .with_required(&["color"]),
    );
    registry.register(
        ToolSchema::new("add_drop_shadow", "Add a drop shadow to the selection")
            .with_property(
                "blur",
                PropertySchema::new(PropertyType::Number)
                    .with_range(Some(0.0), Some(100.0))
                    .with_default(json!(10)),
            )
            .with_property("offset_x", PropertySchema::new(PropertyType::Number))
            .with_property("offset_y", PropertySchema::new(PropertyType::Number))
            .with_property(
                "style",
                PropertySchema::new(PropertyType::String)
                    .with_enum(vec![json!("inner"), json!("outer")]),
            ),
    );
    registry.register(
        ToolSchema::new("move", "Move the selection")
            .with_property("x", PropertySchema::new(PropertyType::Number))
            .with_property("y", PropertySchema::new(PropertyType::Number))
            .with_required(&["x", "y"]),
    );
    registry
}

#[allow(dead_code)]
pub fn default_parser() -> ToolCallParser {
    ToolCallParser::new(Arc::new(default_registry()))
}

#[allow(dead_code)]
pub fn parser_with(config: ParserConfig) -> ToolCallParser {
    ToolCallParser::with_config(config, Arc::new(default_registry()))
}

pub mod streaming_helpers {
    //! Utilities for creating realistic streaming chunks that simulate
    //! how LLM tokens actually arrive (a few characters at a time).

    /// Split input into small char-level chunks (2-3 chars each, sized
    /// deterministically for reproducible tests).
    #[allow(dead_code)]
    pub fn create_realistic_chunks(input: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = input.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let chunk_size = if i + 3 <= chars.len() && chars[i].is_ascii_alphanumeric() {
                3
            } else {
                2
            };
            let end = (i + chunk_size).min(chars.len());
            chunks.push(chars[i..end].iter().collect());
            i = end;
        }
        chunks
    }
}
