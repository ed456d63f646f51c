//! Schema validation of raw tool calls.
//!
//! Combines fuzzy tool-name resolution, parameter mapping, and
//! per-property schema checks into a single pass that either yields a
//! `NormalizedToolCall` or a set of validation errors. Errors are
//! values; nothing in this module panics on malformed input.

use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::fuzzy;
use crate::mapping::{type_matches, ParameterMapper};
use crate::registry::{PropertyType, ToolRegistry, ToolSchema};
use crate::types::{
    clamp_confidence, value_type_name, CallMetadata, ExtractionMethod, FuzzyMatchTrace,
    MatchAlgorithm, NormalizedToolCall, OutputFormat, RawToolCall, ValidationError,
    ValidationErrorKind, ValidationWarning,
};

/// Result of validating one raw call.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Present when the call passed (strict or lenient) validation.
    pub call: Option<NormalizedToolCall>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone)]
pub struct SchemaValidator {
    pub strict: bool,
    pub validate_schema: bool,
    pub fuzzy_tool_matching: bool,
    pub fuzzy_threshold: f64,
    pub mapper: ParameterMapper,
}

impl SchemaValidator {
    pub fn validate(
        &self,
        raw: &RawToolCall,
        registry: &ToolRegistry,
        format: OutputFormat,
        method: Option<ExtractionMethod>,
        confidence: f64,
    ) -> ValidationOutcome {
        let mut errors: Vec<ValidationError> = Vec::new();
        let mut warnings: Vec<ValidationWarning> = Vec::new();

        let Some(input_name) = raw.tool.as_deref() else {
            errors.push(
                ValidationError::new(
                    ValidationErrorKind::InvalidJsonStructure,
                    vec!["tool".to_string()],
                    "tool call has no tool name",
                )
                .with_suggestion("include a \"tool\" or \"name\" field"),
            );
            return ValidationOutcome {
                call: None,
                errors,
                warnings,
            };
        };

        let Some(matched) = fuzzy::resolve_tool(
            input_name,
            registry,
            self.fuzzy_threshold,
            self.fuzzy_tool_matching,
        ) else {
            let suggestions = fuzzy::tool_suggestions(input_name, registry, 3);
            debug!("Unknown tool {:?}; suggestions: {:?}", input_name, suggestions);
            let mut error = ValidationError::new(
                ValidationErrorKind::UnknownTool,
                vec!["tool".to_string()],
                format!("unknown tool '{input_name}'"),
            );
            if let Some(best) = suggestions.first() {
                error = error.with_suggestion(format!("did you mean '{best}'?"));
            }
            errors.push(error);
            return ValidationOutcome {
                call: None,
                errors,
                warnings,
            };
        };

        // `resolve_tool` only returns names present in the registry.
        let Some(schema) = registry.get(&matched.name) else {
            errors.push(ValidationError::new(
                ValidationErrorKind::UnknownTool,
                vec!["tool".to_string()],
                format!("tool '{}' disappeared from the registry", matched.name),
            ));
            return ValidationOutcome {
                call: None,
                errors,
                warnings,
            };
        };

        let fuzzy_trace = if matched.algorithm != MatchAlgorithm::Exact || matched.name != input_name
        {
            if matched.algorithm != MatchAlgorithm::Exact {
                warnings.push(ValidationWarning::new(
                    vec!["tool".to_string()],
                    format!(
                        "tool name '{}' resolved to '{}' via {} match",
                        input_name,
                        matched.name,
                        matched.algorithm.as_str()
                    ),
                ));
            }
            Some(FuzzyMatchTrace {
                original_name: input_name.to_string(),
                matched_name: matched.name.clone(),
                similarity: clamp_confidence(matched.similarity),
                algorithm: matched.algorithm,
            })
        } else {
            None
        };

        let mapped = self.mapper.map_parameters(&raw.parameters, schema);
        errors.extend(mapped.errors.clone());
        warnings.extend(mapped.warnings.clone());

        if self.validate_schema {
            for (name, value) in &mapped.parameters {
                self.check_property(name, value, schema, &mut errors);
            }
        }

        let valid = if self.strict {
            errors.is_empty()
        } else {
            !errors.iter().any(|e| e.kind.fails_lenient())
        };
        if !valid {
            return ValidationOutcome {
                call: None,
                errors,
                warnings,
            };
        }

        let call = NormalizedToolCall {
            id: format!("call_{}", Uuid::new_v4().simple()),
            tool: schema.name.clone(),
            parameters: mapped.parameters,
            confidence: clamp_confidence(confidence),
            format,
            raw: raw.clone(),
            metadata: CallMetadata {
                source_format: format,
                extraction_method: method,
                fuzzy_match: fuzzy_trace,
                parameter_mappings: mapped.mappings,
                coercions: mapped.coercions,
                timestamp: Utc::now(),
            },
        };
        ValidationOutcome {
            call: Some(call),
            errors,
            warnings,
        }
    }

    /// Per-property checks: declared type, numeric range, pattern, enum.
    /// `null` is accepted in lieu of any declared type.
    fn check_property(
        &self,
        name: &str,
        value: &Value,
        schema: &ToolSchema,
        errors: &mut Vec<ValidationError>,
    ) {
        let Some(prop) = schema.property(name) else {
            return;
        };
        if value.is_null() {
            return;
        }
        if !type_matches(value, prop.prop_type) {
            errors.push(
                ValidationError::new(
                    ValidationErrorKind::InvalidType,
                    vec![name.to_string()],
                    format!(
                        "parameter '{}' expected {} but got {}",
                        name,
                        prop.prop_type.as_str(),
                        value_type_name(value)
                    ),
                )
                .with_types(prop.prop_type.as_str(), value_type_name(value)),
            );
            return;
        }
        if prop.prop_type == PropertyType::Number {
            if let Some(n) = value.as_f64() {
                let below = prop.minimum.is_some_and(|min| n < min);
                let above = prop.maximum.is_some_and(|max| n > max);
                if below || above {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::NumberOutOfRange,
                        vec![name.to_string()],
                        format!(
                            "parameter '{}' value {} outside [{}, {}]",
                            name,
                            n,
                            prop.minimum.map_or("-inf".to_string(), |m| m.to_string()),
                            prop.maximum.map_or("inf".to_string(), |m| m.to_string()),
                        ),
                    ));
                }
            }
        }
        if let (Some(pattern), Some(s)) = (&prop.pattern, value.as_str()) {
            match Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(s) {
                        errors.push(
                            ValidationError::new(
                                ValidationErrorKind::StringPatternMismatch,
                                vec![name.to_string()],
                                format!("parameter '{name}' does not match pattern {pattern:?}"),
                            )
                            .with_types(pattern.clone(), s.to_string()),
                        );
                    }
                }
                Err(e) => {
                    debug!("Unusable schema pattern {:?} for '{}': {}", pattern, name, e);
                }
            }
        }
        if let Some(allowed) = &prop.enum_values {
            if !allowed.contains(value) {
                errors.push(
                    ValidationError::new(
                        ValidationErrorKind::InvalidEnumValue,
                        vec![name.to_string()],
                        format!("parameter '{name}' value not in declared enum"),
                    )
                    .with_suggestion(format!(
                        "use one of: {}",
                        allowed
                            .iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )),
                );
            }
        }
    }
}
