//! Thread connection codes.

use super::Normalized;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Built-in aliases: spelled-out variant to short industry code.
pub const CONNECTION_ALIASES: &[(&str, &str)] = &[
    ("buttress", "BTC"),
    ("buttress thread", "BTC"),
    ("buttress thread casing", "BTC"),
    ("long thread casing", "LTC"),
    ("long thread", "LTC"),
    ("short thread casing", "STC"),
    ("short thread", "STC"),
    ("external upset end", "EUE"),
    ("external upset", "EUE"),
    ("8rd eue", "EUE"),
    ("non upset end", "NUE"),
    ("non upset", "NUE"),
    ("line pipe", "LP"),
    ("premium", "PREM"),
];

pub fn default_connection_aliases() -> BTreeMap<String, String> {
    CONNECTION_ALIASES
        .iter()
        .map(|(alias, code)| (alias.to_string(), code.to_string()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ConnectionNormalizer {
    aliases: HashMap<String, String>,
    codes: HashSet<String>,
}

impl ConnectionNormalizer {
    pub fn new(aliases: &BTreeMap<String, String>) -> Self {
        let aliases: HashMap<String, String> = aliases
            .iter()
            .map(|(alias, code)| (fold(alias), code.trim().to_uppercase()))
            .collect();
        let codes = aliases.values().cloned().collect();
        Self { aliases, codes }
    }

    /// Map a connection name to its code. Unknown names pass through with a warning.
    pub fn normalize(&self, value: &str) -> Normalized {
        let trimmed = value.trim();
        let upper = trimmed.to_uppercase();
        if self.codes.contains(&upper) {
            return Normalized::clean(upper);
        }

        match self.aliases.get(&fold(trimmed)) {
            Some(code) => Normalized::clean(code.clone()),
            None => Normalized {
                value: trimmed.to_string(),
                warning: Some(format!("unknown connection '{}' kept as-is", trimmed)),
            },
        }
    }
}

impl Default for ConnectionNormalizer {
    fn default() -> Self {
        Self::new(&default_connection_aliases())
    }
}

/// Lowercase, hyphens to spaces, collapse whitespace.
fn fold(value: &str) -> String {
    value
        .to_lowercase()
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
