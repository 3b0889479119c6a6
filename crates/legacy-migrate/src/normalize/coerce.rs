//! Conversion of normalized strings to typed values.

use super::NormalizeError;
use crate::target::SqlValue;
use crate::typemap::ColumnType;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;

pub const TRUE_TOKENS: &[&str] = &["true", "t", "yes", "y", "1", "-1", "on", "x"];
pub const FALSE_TOKENS: &[&str] = &["false", "f", "no", "n", "0", "off"];

pub fn default_date_formats() -> Vec<String> {
    ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d", "%d-%b-%Y", "%m-%d-%Y"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn default_timestamp_formats() -> Vec<String> {
    [
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %I:%M:%S %p",
        "%Y-%m-%dT%H:%M:%S",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Converts strings to [`SqlValue`]s using ordered lists of accepted formats.
#[derive(Debug, Clone)]
pub struct TypeCoercer {
    date_formats: Vec<String>,
    timestamp_formats: Vec<String>,
}

impl TypeCoercer {
    pub fn new(date_formats: Vec<String>, timestamp_formats: Vec<String>) -> Self {
        Self {
            date_formats,
            timestamp_formats,
        }
    }

    /// Coerce a non-empty value to the requested type.
    pub fn coerce(&self, value: &str, column_type: ColumnType) -> Result<SqlValue, NormalizeError> {
        let value = value.trim();
        match column_type {
            ColumnType::Text => Ok(SqlValue::Text(value.to_string())),
            ColumnType::Integer => value
                .replace(',', "")
                .parse::<i64>()
                .map(SqlValue::I64)
                .map_err(|_| NormalizeError::new(format!("'{}' is not an integer", value))),
            ColumnType::Decimal => {
                let cleaned = value.trim_start_matches('$').replace(',', "");
                Decimal::from_str(&cleaned)
                    .map(SqlValue::Decimal)
                    .map_err(|_| NormalizeError::new(format!("'{}' is not a decimal", value)))
            }
            ColumnType::Boolean => parse_bool(value)
                .map(SqlValue::Bool)
                .ok_or_else(|| NormalizeError::new(format!("'{}' is not a boolean", value))),
            ColumnType::Date => self
                .parse_date(value)
                .map(SqlValue::Date)
                .ok_or_else(|| NormalizeError::new(format!("'{}' is not a recognised date", value))),
            ColumnType::Timestamp => self
                .parse_timestamp(value)
                .map(SqlValue::DateTime)
                .ok_or_else(|| {
                    NormalizeError::new(format!("'{}' is not a recognised timestamp", value))
                }),
        }
    }

    /// Try each date format in order; a timestamp input keeps its date part.
    pub fn parse_date(&self, value: &str) -> Option<NaiveDate> {
        self.parse_date_only(value)
            .or_else(|| self.parse_datetime_only(value).map(|dt| dt.date()))
    }

    /// Try each timestamp format in order, then fall back to a bare date at midnight.
    pub fn parse_timestamp(&self, value: &str) -> Option<NaiveDateTime> {
        self.parse_datetime_only(value)
            .or_else(|| self.parse_date_only(value).and_then(|d| d.and_hms_opt(0, 0, 0)))
    }

    fn parse_date_only(&self, value: &str) -> Option<NaiveDate> {
        self.date_formats.iter().find_map(|fmt| {
            NaiveDate::parse_from_str(value, fmt)
                .ok()
                .filter(|d| full_year(fmt, value, d.year()))
        })
    }

    fn parse_datetime_only(&self, value: &str) -> Option<NaiveDateTime> {
        self.timestamp_formats.iter().find_map(|fmt| {
            NaiveDateTime::parse_from_str(value, fmt)
                .ok()
                .filter(|dt| full_year(fmt, value, dt.year()))
        })
    }
}

impl Default for TypeCoercer {
    fn default() -> Self {
        Self::new(default_date_formats(), default_timestamp_formats())
    }
}

/// `%Y` also matches a one to three digit year ("4/9/18" as year 18);
/// such a match is left to a later `%y` format.
fn full_year(fmt: &str, value: &str, year: i32) -> bool {
    !fmt.contains("%Y") || value.contains(&format!("{:04}", year))
}

fn parse_bool(value: &str) -> Option<bool> {
    let lowered = value.to_lowercase();
    if TRUE_TOKENS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}
