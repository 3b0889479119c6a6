//! Phone numbers and e-mail addresses.

use super::NormalizeError;
use regex::Regex;

#[derive(Debug, Clone, Copy, Default)]
pub struct PhoneNormalizer;

impl PhoneNormalizer {
    /// Format North American numbers as `(AAA) BBB-CCCC`.
    pub fn normalize(&self, value: &str) -> Result<String, NormalizeError> {
        let digits: String = value.chars().filter(char::is_ascii_digit).collect();
        let digits = match digits.len() {
            10 => digits.as_str(),
            11 if digits.starts_with('1') => &digits[1..],
            _ => {
                return Err(NormalizeError::new(format!(
                    "phone '{}' does not have 10 digits",
                    value.trim()
                )))
            }
        };
        Ok(format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]))
    }
}

#[derive(Debug, Clone)]
pub struct EmailNormalizer {
    pattern: Regex,
}

impl EmailNormalizer {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("static pattern"),
        }
    }

    pub fn normalize(&self, value: &str) -> Result<String, NormalizeError> {
        let lowered = value.trim().to_lowercase();
        if self.pattern.is_match(&lowered) {
            Ok(lowered)
        } else {
            Err(NormalizeError::new(format!(
                "'{}' is not an e-mail address",
                value.trim()
            )))
        }
    }
}

impl Default for EmailNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
