//! Customer name cleanup.

use super::NormalizeError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Case policy applied to customer names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStyle {
    /// Every word capitalized.
    #[default]
    Title,
    Upper,
    Lower,
    /// Only the first letter of the name capitalized.
    FirstLetter,
}

/// Punctuation kept by default besides letters, digits and spaces.
pub const DEFAULT_ALLOWED_CHARS: &str = "&.,'-/()";

#[derive(Debug, Clone)]
pub struct CustomerNameNormalizer {
    case: CaseStyle,
    allowed: HashSet<char>,
}

impl CustomerNameNormalizer {
    pub fn new(case: CaseStyle, allowed_chars: &str) -> Self {
        Self {
            case,
            allowed: allowed_chars.chars().collect(),
        }
    }

    pub fn normalize(&self, value: &str) -> Result<String, NormalizeError> {
        let kept: String = value
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || self.allowed.contains(c))
            .collect();
        let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.is_empty() {
            return Err(NormalizeError::new(format!(
                "customer name '{}' has no usable characters",
                value.trim()
            )));
        }

        Ok(match self.case {
            CaseStyle::Upper => collapsed.to_uppercase(),
            CaseStyle::Lower => collapsed.to_lowercase(),
            CaseStyle::Title => collapsed
                .split(' ')
                .map(capitalize)
                .collect::<Vec<_>>()
                .join(" "),
            CaseStyle::FirstLetter => capitalize(&collapsed),
        })
    }
}

impl Default for CustomerNameNormalizer {
    fn default() -> Self {
        Self::new(CaseStyle::default(), DEFAULT_ALLOWED_CHARS)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case_and_whitespace() {
        let names = CustomerNameNormalizer::default();
        assert_eq!(
            names.normalize("  ACME   oilfield   services ").unwrap(),
            "Acme Oilfield Services"
        );
    }

    #[test]
    fn test_strips_disallowed_characters() {
        let names = CustomerNameNormalizer::default();
        assert_eq!(names.normalize("Smith & Sons*, Inc.#").unwrap(), "Smith & Sons, Inc.");
    }

    #[test]
    fn test_case_policies() {
        let upper = CustomerNameNormalizer::new(CaseStyle::Upper, DEFAULT_ALLOWED_CHARS);
        assert_eq!(upper.normalize("big sky drilling").unwrap(), "BIG SKY DRILLING");

        let lower = CustomerNameNormalizer::new(CaseStyle::Lower, DEFAULT_ALLOWED_CHARS);
        assert_eq!(lower.normalize("Big Sky").unwrap(), "big sky");

        let first = CustomerNameNormalizer::new(CaseStyle::FirstLetter, DEFAULT_ALLOWED_CHARS);
        assert_eq!(first.normalize("BIG SKY drilling").unwrap(), "Big sky drilling");
    }

    #[test]
    fn test_nothing_left_fails() {
        let names = CustomerNameNormalizer::default();
        assert!(names.normalize("***").is_err());
    }
}
