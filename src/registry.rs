//! Tool schema registry.
//!
//! The registry is owned by the caller and shared read-only with the
//! parser; no parse path ever mutates it. Tool names are keyed
//! lower-cased, with a caller-managed alias map resolving alternate
//! spellings to canonical names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declared type of a schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Array => "array",
            PropertyType::Object => "object",
            PropertyType::Null => "null",
        }
    }
}

/// A subset of JSON Schema sufficient for tool parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: PropertyType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl PropertySchema {
    pub fn new(prop_type: PropertyType) -> Self {
        Self {
            prop_type,
            description: None,
            enum_values: None,
            items: None,
            properties: None,
            required: None,
            minimum: None,
            maximum: None,
            pattern: None,
            default: None,
            aliases: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// Schema for one registered tool. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub id: String,
    pub name: String,
    pub description: String,
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            description: description.into(),
            properties: Map::new(),
            required: Vec::new(),
            defaults: None,
            aliases: Vec::new(),
            category: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        let value = serde_json::to_value(&schema).unwrap_or(Value::Null);
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_required(mut self, names: &[&str]) -> Self {
        self.required = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Deserialize the schema of one property, if it is well-formed.
    pub fn property(&self, name: &str) -> Option<PropertySchema> {
        self.properties
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Declared default for a property: tool-level defaults map first,
    /// then the property's own `default`.
    pub fn default_for(&self, name: &str) -> Option<Value> {
        if let Some(defaults) = &self.defaults {
            if let Some(v) = defaults.get(name) {
                return Some(v.clone());
            }
        }
        self.property(name).and_then(|p| p.default)
    }
}

/// Ordered set of tool schemas keyed by lower-cased name.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolSchema>,
    /// Registration order of lower-cased names.
    order: Vec<String>,
    /// Lower-cased alias -> canonical lower-cased name.
    aliases: HashMap<String, String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any previous tool of the same name.
    /// The schema's own aliases are folded into the alias map.
    pub fn register(&mut self, schema: ToolSchema) {
        let key = schema.name.to_lowercase();
        for alias in &schema.aliases {
            self.aliases.insert(alias.to_lowercase(), key.clone());
        }
        if !self.tools.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.tools.insert(key, schema);
    }

    pub fn register_all(&mut self, schemas: Vec<ToolSchema>) {
        for schema in schemas {
            self.register(schema);
        }
    }

    /// Look up a tool by name or alias, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&ToolSchema> {
        let key = self.resolve_canonical(name);
        self.tools.get(&key)
    }

    /// Registered tool names, in registration order, as registered.
    pub fn tool_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|k| self.tools.get(k).map(|s| s.name.clone()))
            .collect()
    }

    pub fn all_schemas(&self) -> Vec<&ToolSchema> {
        self.order.iter().filter_map(|k| self.tools.get(k)).collect()
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.aliases
            .insert(alias.into().to_lowercase(), canonical.into().to_lowercase());
    }

    pub fn remove_alias(&mut self, alias: &str) {
        self.aliases.remove(&alias.to_lowercase());
    }

    /// Resolve a name through the alias map to its canonical lower-cased
    /// form. Names with no alias entry lower-case unchanged.
    pub fn resolve_canonical(&self, name: &str) -> String {
        let key = name.to_lowercase();
        self.aliases.get(&key).cloned().unwrap_or(key)
    }

    /// All aliases registered for a canonical name.
    pub fn get_aliases(&self, name: &str) -> Vec<String> {
        let canonical = self.resolve_canonical(name);
        let mut out: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, target)| **target == canonical)
            .map(|(alias, _)| alias.clone())
            .collect();
        out.sort();
        out
    }

    pub fn clear(&mut self) {
        self.tools.clear();
        self.order.clear();
        self.aliases.clear();
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
