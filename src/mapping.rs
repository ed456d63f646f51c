//! Parameter mapping: resolve input keys to schema property names and
//! coerce values toward declared types.
//!
//! Resolution order per key: exact (case-insensitive) match, static
//! alias canonicalization, then fuzzy comparison against the schema's
//! property names. Every rename and every type change is recorded.

use serde_json::{Map, Number, Value};

use crate::fuzzy::{self, STATIC_PARAM_ALIASES};
use crate::registry::{PropertyType, ToolSchema};
use crate::types::{
    value_type_name, CoercedValue, MappingMethod, MatchAlgorithm, ParameterMapping,
    ValidationError, ValidationErrorKind, ValidationWarning,
};

/// Outcome of mapping one raw parameter map against a schema.
#[derive(Debug, Clone, Default)]
pub struct MappedParameters {
    pub parameters: Map<String, Value>,
    pub mappings: Vec<ParameterMapping>,
    pub coercions: Vec<CoercedValue>,
    pub warnings: Vec<ValidationWarning>,
    pub errors: Vec<ValidationError>,
    /// Input keys that resolved to no schema property.
    pub unmapped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ParameterMapper {
    pub fuzzy_threshold: f64,
    pub semantic_aliases: bool,
    pub coerce_types: bool,
    pub inject_defaults: bool,
    pub strict: bool,
}

impl Default for ParameterMapper {
    fn default() -> Self {
        Self {
            fuzzy_threshold: fuzzy::PARAM_THRESHOLD,
            semantic_aliases: true,
            coerce_types: true,
            inject_defaults: true,
            strict: false,
        }
    }
}

impl ParameterMapper {
    pub fn map_parameters(&self, input: &Map<String, Value>, schema: &ToolSchema) -> MappedParameters {
        let mut out = MappedParameters::default();
        let property_names: Vec<String> = schema.properties.keys().cloned().collect();

        for (key, value) in input {
            let resolved = self.resolve_key(key, schema, &property_names);
            match resolved {
                Some((target, method, similarity)) => {
                    if out.parameters.contains_key(&target) {
                        out.warnings.push(ValidationWarning::new(
                            vec![key.clone()],
                            format!("parameter '{key}' also mapped to '{target}'; keeping the first value"),
                        ));
                        continue;
                    }
                    let (final_value, coercion) = self.coerce_for(&target, value, schema);
                    if let Some(coercion) = coercion {
                        out.coercions.push(coercion);
                    }
                    if key != &target || method != MappingMethod::Direct {
                        out.mappings.push(ParameterMapping {
                            source: key.clone(),
                            target: target.clone(),
                            method,
                            similarity,
                        });
                    }
                    out.parameters.insert(target, final_value);
                }
                None => {
                    out.unmapped.push(key.clone());
                    if self.strict {
                        out.errors.push(
                            ValidationError::new(
                                ValidationErrorKind::SchemaMismatch,
                                vec![key.clone()],
                                format!("unknown parameter '{key}'"),
                            )
                            .with_suggestion(format!(
                                "remove '{key}' or add it to the tool schema"
                            )),
                        );
                    } else {
                        out.warnings.push(ValidationWarning::new(
                            vec![key.clone()],
                            format!("unknown parameter '{key}' passed through unvalidated"),
                        ));
                        out.parameters.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        // Defaults for missing requireds, then report what remains.
        for required in &schema.required {
            if out.parameters.contains_key(required) {
                continue;
            }
            if self.inject_defaults {
                if let Some(default) = schema.default_for(required) {
                    out.parameters.insert(required.clone(), default.clone());
                    out.warnings.push(ValidationWarning::new(
                        vec![required.clone()],
                        format!("missing required parameter '{required}' filled from schema default"),
                    ));
                    continue;
                }
            }
            out.errors.push(
                ValidationError::new(
                    ValidationErrorKind::RequiredParameterMissing,
                    vec![required.clone()],
                    format!("missing required parameter '{required}'"),
                )
                .with_suggestion(format!("provide a value for '{required}'")),
            );
        }

        out
    }

    fn resolve_key(
        &self,
        key: &str,
        schema: &ToolSchema,
        property_names: &[String],
    ) -> Option<(String, MappingMethod, f64)> {
        if schema.properties.contains_key(key) {
            return Some((key.to_string(), MappingMethod::Direct, 1.0));
        }
        let lower = key.to_lowercase();
        if let Some(name) = property_names.iter().find(|n| n.to_lowercase() == lower) {
            return Some((name.clone(), MappingMethod::CaseInsensitive, 1.0));
        }

        if self.semantic_aliases {
            // Property-level aliases declared in the schema.
            for name in property_names {
                if let Some(prop) = schema.property(name) {
                    if prop.aliases.iter().any(|a| a.to_lowercase() == lower) {
                        return Some((name.clone(), MappingMethod::Alias, 0.95));
                    }
                }
            }
            if let Some((_, canonical)) = STATIC_PARAM_ALIASES
                .iter()
                .find(|(alias, _)| *alias == lower)
            {
                if let Some(name) = property_names
                    .iter()
                    .find(|n| n.to_lowercase() == *canonical)
                {
                    return Some((name.clone(), MappingMethod::Alias, 0.95));
                }
            }
        }

        fuzzy::top_matches(
            key,
            property_names,
            self.fuzzy_threshold,
            1,
            MatchAlgorithm::JaroWinkler,
        )
        .into_iter()
        .next()
        .map(|m| (m.name, MappingMethod::Fuzzy, m.similarity))
    }

    fn coerce_for(
        &self,
        target: &str,
        value: &Value,
        schema: &ToolSchema,
    ) -> (Value, Option<CoercedValue>) {
        if !self.coerce_types {
            return (value.clone(), None);
        }
        let Some(prop) = schema.property(target) else {
            return (value.clone(), None);
        };
        if type_matches(value, prop.prop_type) || value.is_null() {
            return (value.clone(), None);
        }
        match coerce_value(value, prop.prop_type) {
            Some((coerced, label)) => {
                let record = CoercedValue {
                    parameter: target.to_string(),
                    original: value.clone(),
                    coerced: coerced.clone(),
                    coercion: label,
                };
                (coerced, Some(record))
            }
            None => (value.clone(), None),
        }
    }
}

/// Does a value's runtime type already satisfy a declared type?
pub fn type_matches(value: &Value, declared: PropertyType) -> bool {
    match declared {
        PropertyType::String => value.is_string(),
        PropertyType::Number => value.is_number(),
        PropertyType::Boolean => value.is_boolean(),
        PropertyType::Array => value.is_array(),
        PropertyType::Object => value.is_object(),
        PropertyType::Null => value.is_null(),
    }
}

/// Unit suffixes stripped when coercing strings to numbers.
const NUMBER_UNITS: &[&str] = &["px", "%", "rem", "em", "pt", "deg"];

/// Deterministic coercion toward a declared type. Returns the new value
/// and a coercion label, or `None` when no rule applies.
pub fn coerce_value(value: &Value, declared: PropertyType) -> Option<(Value, String)> {
    match declared {
        PropertyType::Number => coerce_to_number(value),
        PropertyType::String => coerce_to_string(value),
        PropertyType::Boolean => coerce_to_boolean(value),
        PropertyType::Array => coerce_to_array(value),
        PropertyType::Object | PropertyType::Null => None,
    }
}

fn number_value(parsed: f64) -> Option<Value> {
    if parsed.fract() == 0.0 && parsed.abs() < i64::MAX as f64 {
        Some(Value::Number(Number::from(parsed as i64)))
    } else {
        Number::from_f64(parsed).map(Value::Number)
    }
}

fn coerce_to_number(value: &Value) -> Option<(Value, String)> {
    let s = value.as_str()?.trim();
    if let Ok(parsed) = s.parse::<f64>() {
        return number_value(parsed).map(|v| (v, "string_to_number".to_string()));
    }
    for unit in NUMBER_UNITS {
        if let Some(prefix) = s.strip_suffix(unit) {
            if let Ok(parsed) = prefix.trim().parse::<f64>() {
                return number_value(parsed)
                    .map(|v| (v, format!("unit_string_to_number:{unit}")));
            }
        }
    }
    None
}

fn coerce_to_string(value: &Value) -> Option<(Value, String)> {
    match value {
        Value::Number(n) => Some((Value::String(n.to_string()), "number_to_string".to_string())),
        Value::Bool(b) => Some((Value::String(b.to_string()), "boolean_to_string".to_string())),
        Value::Object(map) => {
            if let Some(formatted) = format_rgb(map) {
                return Some((Value::String(formatted), "color_to_string".to_string()));
            }
            if let Some(formatted) = format_hsl(map) {
                return Some((Value::String(formatted), "color_to_string".to_string()));
            }
            None
        }
        _ => None,
    }
}

fn coerce_to_boolean(value: &Value) -> Option<(Value, String)> {
    match value {
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some((Value::Bool(true), "string_to_boolean".to_string())),
            "false" | "no" | "0" => Some((Value::Bool(false), "string_to_boolean".to_string())),
            _ => None,
        },
        Value::Number(n) => {
            let truthy = n.as_f64().map(|f| f != 0.0).unwrap_or(false);
            Some((Value::Bool(truthy), "number_to_boolean".to_string()))
        }
        _ => None,
    }
}

fn coerce_to_array(value: &Value) -> Option<(Value, String)> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Some((
            Value::Array(vec![value.clone()]),
            format!("{}_to_array", value_type_name(value)),
        )),
        _ => None,
    }
}

fn channel(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64)
}

/// `{r,g,b,a?}` -> `rgb(R,G,B)` / `rgba(R,G,B,A)`, channels auto-scaled
/// from 0–1 to 0–255 when all of r, g, b are <= 1.
fn format_rgb(map: &Map<String, Value>) -> Option<String> {
    let r = channel(map, "r")?;
    let g = channel(map, "g")?;
    let b = channel(map, "b")?;
    let scale = if r <= 1.0 && g <= 1.0 && b <= 1.0 {
        255.0
    } else {
        1.0
    };
    let (r, g, b) = (
        (r * scale).round() as i64,
        (g * scale).round() as i64,
        (b * scale).round() as i64,
    );
    match channel(map, "a") {
        Some(a) => Some(format!("rgba({r}, {g}, {b}, {a})")),
        None => Some(format!("rgb({r}, {g}, {b})")),
    }
}

/// `{h,s,l,a?}` -> `hsl(H, S%, L%)` / `hsla(...)`, s/l auto-scaled to
/// percent when both are <= 1.
fn format_hsl(map: &Map<String, Value>) -> Option<String> {
    let h = channel(map, "h")?;
    let s = channel(map, "s")?;
    let l = channel(map, "l")?;
    let scale = if s <= 1.0 && l <= 1.0 { 100.0 } else { 1.0 };
    let h = h.round() as i64;
    let s = (s * scale).round() as i64;
    let l = (l * scale).round() as i64;
    match channel(map, "a") {
        Some(a) => Some(format!("hsla({h}, {s}%, {l}%, {a})")),
        None => Some(format!("hsl({h}, {s}%, {l}%)")),
    }
}
