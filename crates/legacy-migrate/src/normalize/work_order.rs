//! Work-order numbers (`PREFIX-NNNNNN`).

use super::NormalizeError;
use crate::error::MigrateError;
use regex::Regex;

/// Default zero-padded width of the numeric part.
pub const DEFAULT_WIDTH: usize = 6;

/// Widest numeric part accepted from configuration.
pub const MAX_WIDTH: usize = 18;

const SHAPE: &str = r"^([A-Z]+)[^A-Z0-9]*([0-9]+)$";

#[derive(Debug, Clone)]
pub struct WorkOrderNormalizer {
    width: usize,
    shape: Regex,
    canonical: Regex,
}

impl WorkOrderNormalizer {
    /// Build a normalizer padding to `width` digits.
    pub fn new(width: usize) -> crate::error::Result<Self> {
        if width == 0 || width > MAX_WIDTH {
            return Err(MigrateError::Config(format!(
                "work order width must be between 1 and {}, got {}",
                MAX_WIDTH, width
            )));
        }
        let shape = Regex::new(SHAPE).map_err(|e| MigrateError::Config(e.to_string()))?;
        let canonical = Regex::new(&format!(r"^[A-Z]{{1,4}}-[0-9]{{{}}}$", width))
            .map_err(|e| MigrateError::Config(format!("work order pattern: {}", e)))?;
        Ok(Self {
            width,
            shape,
            canonical,
        })
    }

    pub fn normalize(&self, value: &str) -> Result<String, NormalizeError> {
        let upper = value.trim().to_uppercase();

        let caps = self.shape.captures(&upper).ok_or_else(|| {
            NormalizeError::with_fix(
                format!("work order '{}' is not LETTERS + NUMBER", value.trim()),
                format!("expected PREFIX-{}", "N".repeat(self.width)),
            )
        })?;
        let prefix = &caps[1];
        let number = &caps[2];

        if number.len() > self.width {
            return Err(NormalizeError::new(format!(
                "work order number '{}' exceeds {} digits",
                number, self.width
            )));
        }

        let formatted = format!("{}-{:0>width$}", prefix, number, width = self.width);
        if !self.canonical.is_match(&formatted) {
            return Err(NormalizeError::new(format!(
                "work order '{}' does not match {}",
                formatted,
                self.canonical.as_str()
            )));
        }
        Ok(formatted)
    }

    /// The canonical pattern, for use in format rules.
    pub fn pattern(&self) -> &str {
        self.canonical.as_str()
    }
}

impl Default for WorkOrderNormalizer {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            shape: Regex::new(SHAPE).expect("static pattern"),
            canonical: Regex::new(r"^[A-Z]{1,4}-[0-9]{6}$").expect("static pattern"),
        }
    }
}
