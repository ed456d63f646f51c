//! Fuzzy name resolution.
//!
//! Decides whether an unknown input string corresponds to a known
//! canonical name: exact case-insensitive match first, then alias maps,
//! then string similarity over the candidate list.

use crate::registry::ToolRegistry;
use crate::types::MatchAlgorithm;

/// Default minimum similarity for tool-name matches.
pub const TOOL_THRESHOLD: f64 = 0.6;
/// Default minimum similarity for parameter-name matches.
pub const PARAM_THRESHOLD: f64 = 0.7;

/// One fuzzy match against a candidate list.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub name: String,
    pub similarity: f64,
    pub algorithm: MatchAlgorithm,
}

/// Classical Levenshtein edit distance over lower-cased inputs.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Normalized Levenshtein similarity: `1 - distance / max(len)`;
/// 1 for identical inputs, 0 when either side is empty.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b).clamp(0.0, 1.0)
}

/// Jaro–Winkler similarity (length-4 prefix bonus, 0.1 scaling) over
/// lower-cased inputs.
pub fn jaro_winkler_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&a.to_lowercase(), &b.to_lowercase()).clamp(0.0, 1.0)
}

fn similarity(a: &str, b: &str, algorithm: MatchAlgorithm) -> f64 {
    match algorithm {
        MatchAlgorithm::Levenshtein => levenshtein_similarity(a, b),
        _ => jaro_winkler_similarity(a, b),
    }
}

/// Built-in aliases for common tool-name drift. Consulted after the
/// registry's own alias map, before fuzzy comparison.
pub const STATIC_TOOL_ALIASES: &[(&str, &str)] = &[
    ("rect", "create_rectangle"),
    ("rectangle", "create_rectangle"),
    ("draw_rectangle", "create_rectangle"),
    ("make_rectangle", "create_rectangle"),
    ("fill", "set_fill_color"),
    ("fill_color", "set_fill_color"),
    ("set_color", "set_fill_color"),
    ("shadow", "add_drop_shadow"),
    ("drop_shadow", "add_drop_shadow"),
    ("box_shadow", "add_drop_shadow"),
    ("translate", "move"),
    ("move_to", "move"),
    ("reposition", "move"),
];

/// Built-in parameter-name aliases, applied during mapping.
pub const STATIC_PARAM_ALIASES: &[(&str, &str)] = &[
    ("colour", "color"),
    ("fill", "color"),
    ("w", "width"),
    ("h", "height"),
    ("x_pos", "x"),
    ("left", "x"),
    ("y_pos", "y"),
    ("top", "y"),
    ("txt", "text"),
    ("content", "text"),
    ("val", "value"),
    ("amount", "value"),
    ("radius", "blur"),
];

fn static_alias<'a>(input: &str, aliases: &'a [(&'a str, &'a str)]) -> Option<&'a str> {
    let key = input.to_lowercase();
    aliases
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| *canonical)
}

/// Match `input` against `candidates`: exact case-insensitive wins at
/// 1.0, an alias-list hit wins at 0.95, otherwise the best similarity
/// at or above `threshold`.
pub fn best_match(
    input: &str,
    candidates: &[String],
    threshold: f64,
    aliases: &[(&str, &str)],
    algorithm: MatchAlgorithm,
) -> Option<FuzzyMatch> {
    let key = input.to_lowercase();
    for candidate in candidates {
        if candidate.to_lowercase() == key {
            return Some(FuzzyMatch {
                name: candidate.clone(),
                similarity: 1.0,
                algorithm: MatchAlgorithm::Exact,
            });
        }
    }
    if let Some(canonical) = static_alias(input, aliases) {
        if let Some(candidate) = candidates
            .iter()
            .find(|c| c.to_lowercase() == canonical.to_lowercase())
        {
            return Some(FuzzyMatch {
                name: candidate.clone(),
                similarity: 0.95,
                algorithm: MatchAlgorithm::Alias,
            });
        }
    }
    top_matches(input, candidates, threshold, 1, algorithm)
        .into_iter()
        .next()
}

/// The top `n` fuzzy matches at or above `threshold`, best first.
pub fn top_matches(
    input: &str,
    candidates: &[String],
    threshold: f64,
    n: usize,
    algorithm: MatchAlgorithm,
) -> Vec<FuzzyMatch> {
    let mut scored: Vec<FuzzyMatch> = candidates
        .iter()
        .map(|candidate| FuzzyMatch {
            name: candidate.clone(),
            similarity: similarity(input, candidate, algorithm),
            algorithm,
        })
        .filter(|m| m.similarity >= threshold)
        .collect();
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(n);
    scored
}

/// Resolve a tool name against a registry: direct lookup, the
/// registry's custom aliases, the static alias table, then fuzzy
/// comparison over registered names.
pub fn resolve_tool(
    input: &str,
    registry: &ToolRegistry,
    threshold: f64,
    fuzzy_enabled: bool,
) -> Option<FuzzyMatch> {
    let key = input.to_lowercase();

    if let Some(schema) = registry.get(&key) {
        let via_alias = registry.resolve_canonical(&key) != key;
        return Some(FuzzyMatch {
            name: schema.name.clone(),
            similarity: if via_alias { 0.95 } else { 1.0 },
            algorithm: if via_alias {
                MatchAlgorithm::Alias
            } else {
                MatchAlgorithm::Exact
            },
        });
    }

    if let Some(canonical) = static_alias(input, STATIC_TOOL_ALIASES) {
        if let Some(schema) = registry.get(canonical) {
            return Some(FuzzyMatch {
                name: schema.name.clone(),
                similarity: 0.95,
                algorithm: MatchAlgorithm::Alias,
            });
        }
    }

    if !fuzzy_enabled {
        return None;
    }
    let names = registry.tool_names();
    top_matches(input, &names, threshold, 1, MatchAlgorithm::JaroWinkler)
        .into_iter()
        .next()
}

/// Fuzzy suggestions for an unresolvable tool name, best first.
pub fn tool_suggestions(input: &str, registry: &ToolRegistry, n: usize) -> Vec<String> {
    let names = registry.tool_names();
    top_matches(input, &names, 0.0, n, MatchAlgorithm::JaroWinkler)
        .into_iter()
        .map(|m| m.name)
        .collect()
}
