//! Pipe outside-diameter sizes.
//!
//! Legacy exports store sizes as decimal inches (`5.5`), as already
//! formatted fractions (`5 1/2"`) or with a unit suffix (`5.5 inch`).
//! The canonical form is the fractional display string from
//! [`SIZE_TABLE`]; anything not in the table is rejected.

use super::NormalizeError;

/// Decimal inch value and its canonical display form.
pub const SIZE_TABLE: &[(f64, &str)] = &[
    (2.375, "2 3/8\""),
    (2.875, "2 7/8\""),
    (3.5, "3 1/2\""),
    (4.0, "4\""),
    (4.5, "4 1/2\""),
    (5.0, "5\""),
    (5.5, "5 1/2\""),
    (6.625, "6 5/8\""),
    (7.0, "7\""),
    (7.625, "7 5/8\""),
    (8.625, "8 5/8\""),
    (9.625, "9 5/8\""),
    (10.75, "10 3/4\""),
    (11.75, "11 3/4\""),
    (13.375, "13 3/8\""),
    (16.0, "16\""),
    (18.625, "18 5/8\""),
    (20.0, "20\""),
];

const SUFFIXES: &[&str] = &["inches", "inch", "in.", "in", "\"", "''"];
const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct SizeNormalizer;

impl SizeNormalizer {
    /// Convert a size to its canonical display form.
    pub fn normalize(&self, value: &str) -> Result<String, NormalizeError> {
        let trimmed = value.trim();

        if let Some((_, display)) = SIZE_TABLE.iter().find(|(_, d)| *d == trimmed) {
            return Ok(display.to_string());
        }

        let inches = parse_inches(trimmed)
            .ok_or_else(|| NormalizeError::new(format!("'{}' is not a size", trimmed)))?;

        lookup(inches).map(str::to_string).ok_or_else(|| NormalizeError {
            message: format!("no standard size for {} inches", inches),
            suggested_fix: nearest(inches).map(|d| format!("closest standard size is {}", d)),
        })
    }
}

/// Find the display form for a decimal inch value.
pub fn lookup(inches: f64) -> Option<&'static str> {
    SIZE_TABLE
        .iter()
        .find(|(dec, _)| (dec - inches).abs() < TOLERANCE)
        .map(|(_, display)| *display)
}

fn nearest(inches: f64) -> Option<&'static str> {
    SIZE_TABLE
        .iter()
        .min_by(|a, b| {
            (a.0 - inches)
                .abs()
                .partial_cmp(&(b.0 - inches).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .filter(|(dec, _)| (dec - inches).abs() <= 0.25)
        .map(|(_, display)| *display)
}

/// Parse `5.5`, `5 1/2`, `5-1/2`, `1/2` with an optional unit suffix.
fn parse_inches(value: &str) -> Option<f64> {
    let mut s = value.to_lowercase();
    for suffix in SUFFIXES {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.trim_end().to_string();
            break;
        }
    }
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if !s.contains('/') {
        return s.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0);
    }

    let (whole, fraction) = match s.rsplit_once([' ', '-']) {
        Some((whole, fraction)) => (whole.trim().parse::<f64>().ok()?, fraction),
        None => (0.0, s),
    };
    let (num, den) = fraction.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(whole + num / den)
}
