//! Query expansion and variation tables
//!
//! Two small lexical tables back the contextual and multi-query
//! strategies: an expansion table appending related terms to a query,
//! and a synonym table substituting single words to produce query
//! variations. Both ship with built-in defaults and can be replaced
//! wholesale from configuration.

use super::keywords::tokenize;

/// Terms appended to a query when the key appears as a token
const BUILTIN_EXPANSIONS: &[(&str, &[&str])] = &[
    ("ai", &["artificial intelligence", "machine learning"]),
    ("ml", &["machine learning", "neural networks"]),
    ("db", &["database", "storage"]),
    ("api", &["interface", "endpoint"]),
    ("python", &["programming", "code"]),
    ("rust", &["programming", "systems"]),
    ("error", &["exception", "failure", "bug"]),
    ("config", &["configuration", "settings"]),
];

/// Single-word substitutions used to generate query variations
const BUILTIN_SYNONYMS: &[(&str, &[&str])] = &[
    ("build", &["create", "make"]),
    ("fix", &["repair", "resolve"]),
    ("delete", &["remove", "drop"]),
    ("fast", &["quick", "rapid"]),
    ("big", &["large", "huge"]),
    ("small", &["tiny", "little"]),
    ("use", &["apply", "employ"]),
    ("show", &["display", "list"]),
];

/// Lexical tables for the contextual and multi-query strategies
#[derive(Debug, Clone)]
pub struct ExpansionTables {
    expansions: Vec<(String, Vec<String>)>,
    synonyms: Vec<(String, Vec<String>)>,
}

impl Default for ExpansionTables {
    fn default() -> Self {
        Self {
            expansions: to_owned_table(BUILTIN_EXPANSIONS),
            synonyms: to_owned_table(BUILTIN_SYNONYMS),
        }
    }
}

impl ExpansionTables {
    /// Built-in tables with either side optionally replaced; override
    /// entries are sorted by key so variation order is deterministic
    pub fn with_overrides(
        expansions: Option<Vec<(String, Vec<String>)>>,
        synonyms: Option<Vec<(String, Vec<String>)>>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            expansions: expansions.map(sorted_table).unwrap_or(defaults.expansions),
            synonyms: synonyms.map(sorted_table).unwrap_or(defaults.synonyms),
        }
    }

    /// Append expansion terms for every table key present in the query.
    /// Terms already present in the query (or already appended) are
    /// skipped; a query without table hits comes back unchanged.
    pub fn expand_query(&self, query: &str) -> String {
        let tokens = tokenize(query);
        let lower = query.to_lowercase();
        let mut additions: Vec<String> = Vec::new();

        for (term, expansions) in &self.expansions {
            if tokens.iter().any(|t| t == term) {
                for expansion in expansions {
                    if !lower.contains(expansion.as_str()) && !additions.contains(expansion) {
                        additions.push(expansion.clone());
                    }
                }
            }
        }

        if additions.is_empty() {
            query.to_string()
        } else {
            format!("{} {}", query, additions.join(" "))
        }
    }

    /// Lexical variations of the query, original first, capped at
    /// `max_variations` entries total
    pub fn query_variations(&self, query: &str, max_variations: usize) -> Vec<String> {
        let mut variations = vec![query.to_string()];

        'outer: for (term, substitutes) in &self.synonyms {
            for substitute in substitutes {
                if variations.len() >= max_variations.max(1) {
                    break 'outer;
                }
                if let Some(variation) = substitute_word(query, term, substitute) {
                    if !variations.contains(&variation) {
                        variations.push(variation);
                    }
                }
            }
        }

        variations
    }
}

/// Replace the first whole-word occurrence of `term` (case-insensitive,
/// punctuation preserved); `None` when the term does not occur
fn substitute_word(query: &str, term: &str, substitute: &str) -> Option<String> {
    let mut replaced = false;
    let words: Vec<String> = query
        .split_whitespace()
        .map(|word| {
            let core = word.trim_matches(|c: char| !c.is_alphanumeric());
            if !replaced && !core.is_empty() && core.to_lowercase() == term {
                replaced = true;
                word.replacen(core, substitute, 1)
            } else {
                word.to_string()
            }
        })
        .collect();

    if replaced {
        Some(words.join(" "))
    } else {
        None
    }
}

fn to_owned_table(table: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
    table
        .iter()
        .map(|(k, vs)| {
            (
                k.to_string(),
                vs.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

fn sorted_table(mut table: Vec<(String, Vec<String>)>) -> Vec<(String, Vec<String>)> {
    for (key, _) in &mut table {
        *key = key.to_lowercase();
    }
    table.sort_by(|a, b| a.0.cmp(&b.0));
    table
}
