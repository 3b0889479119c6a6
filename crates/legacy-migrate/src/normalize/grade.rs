//! Pipe grade codes (API 5CT).

use super::NormalizeError;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Grades accepted as canonical.
pub const CANONICAL_GRADES: &[&str] = &[
    "H40", "J55", "K55", "M65", "N80", "L80", "C90", "T95", "C110", "P110", "Q125",
];

/// Grades withdrawn from the standard, with their usual replacement.
pub const DEPRECATED_GRADES: &[(&str, Option<&str>)] = &[("C75", Some("L80")), ("C95", Some("T95"))];

/// Default deprecated-grade table in configuration form.
pub fn default_deprecated_grades() -> BTreeMap<String, Option<String>> {
    DEPRECATED_GRADES
        .iter()
        .map(|(code, replacement)| (code.to_string(), replacement.map(str::to_string)))
        .collect()
}

/// Grade normalizer backed by a canonical dictionary.
#[derive(Debug, Clone)]
pub struct GradeNormalizer {
    canonical: HashSet<String>,
    deprecated: HashMap<String, Option<String>>,
}

impl GradeNormalizer {
    pub fn new(extra_grades: &[String], deprecated: &BTreeMap<String, Option<String>>) -> Self {
        let deprecated: HashMap<String, Option<String>> = deprecated
            .iter()
            .map(|(code, replacement)| (fold(code), replacement.as_deref().map(fold)))
            .collect();

        let canonical = CANONICAL_GRADES
            .iter()
            .map(|g| g.to_string())
            .chain(extra_grades.iter().map(|g| fold(g)))
            .filter(|g| !deprecated.contains_key(g))
            .collect();

        Self {
            canonical,
            deprecated,
        }
    }

    /// Normalize a grade to its canonical code.
    pub fn normalize(&self, value: &str) -> Result<String, NormalizeError> {
        let folded = fold(value);

        if self.canonical.contains(&folded) {
            return Ok(folded);
        }

        if let Some(replacement) = self.deprecated.get(&folded) {
            return Err(NormalizeError {
                message: format!("grade '{}' is deprecated", value.trim()),
                suggested_fix: replacement
                    .as_ref()
                    .map(|r| format!("replace with {}", r)),
            });
        }

        Err(NormalizeError::new(format!("unknown grade '{}'", value.trim())))
    }

    /// Whether a code is in the canonical dictionary.
    pub fn is_canonical(&self, code: &str) -> bool {
        self.canonical.contains(code)
    }
}

impl Default for GradeNormalizer {
    fn default() -> Self {
        Self::new(&[], &default_deprecated_grades())
    }
}

/// Strip hyphens and whitespace, uppercase.
fn fold(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}
