//! Column types and their PostgreSQL mapping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column type carried through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// Map a logical column type to PostgreSQL.
pub fn to_postgres(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Text => "text",
        ColumnType::Integer => "bigint",
        ColumnType::Decimal => "numeric",
        ColumnType::Boolean => "boolean",
        ColumnType::Date => "date",
        ColumnType::Timestamp => "timestamp",
    }
}

/// Guess a column type from sample values; empty samples give `Text`.
///
/// Used for reporting the legacy column type during analysis. Target types
/// come from configuration, never from this guess.
pub fn infer_from_samples<'a>(samples: impl IntoIterator<Item = &'a str>) -> ColumnType {
    let samples: Vec<&str> = samples
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if samples.is_empty() {
        return ColumnType::Text;
    }

    if samples.iter().all(|s| s.parse::<i64>().is_ok()) {
        ColumnType::Integer
    } else if samples.iter().all(|s| s.parse::<f64>().is_ok()) {
        ColumnType::Decimal
    } else if samples.iter().all(|s| {
        matches!(
            s.to_lowercase().as_str(),
            "true" | "false" | "yes" | "no"
        )
    }) {
        ColumnType::Boolean
    } else if samples.iter().all(|s| looks_like_date(s)) {
        if samples.iter().any(|s| s.contains(':')) {
            ColumnType::Timestamp
        } else {
            ColumnType::Date
        }
    } else {
        ColumnType::Text
    }
}

fn looks_like_date(s: &str) -> bool {
    let date_part = s.split([' ', 'T']).next().unwrap_or("");
    let parts: Vec<&str> = date_part.split(['/', '-']).collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
