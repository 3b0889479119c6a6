//! Typed values produced by the transformer and consumed by every sink.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt;

/// A normalized, type-coerced field value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Text form used in delimited output (NULL is an empty field).
    pub fn to_text(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::I64(n) => n.to_string(),
            SqlValue::Decimal(d) => d.normalize().to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Literal form for SQL scripts.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::I64(_) | SqlValue::Decimal(_) => self.to_text(),
            SqlValue::Text(_) | SqlValue::Date(_) | SqlValue::DateTime(_) => {
                quote_literal(&self.to_text())
            }
        }
    }

    /// Parameter form for the direct target: NULL or text with a cast.
    pub fn to_param(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(if *b { "t".to_string() } else { "f".to_string() }),
            other => Some(other.to_text()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Quote a string as a SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualify a table name.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_text_forms() {
        assert_eq!(SqlValue::Null.to_text(), "");
        assert_eq!(SqlValue::Bool(true).to_text(), "true");
        assert_eq!(
            SqlValue::Decimal(Decimal::from_str("12.50").unwrap()).to_text(),
            "12.5"
        );
        let date = NaiveDate::from_ymd_opt(2019, 3, 7).unwrap();
        assert_eq!(SqlValue::Date(date).to_text(), "2019-03-07");
    }

    #[test]
    fn test_sql_literals_escape_quotes() {
        assert_eq!(
            SqlValue::Text("O'Brien Supply".into()).to_sql_literal(),
            "'O''Brien Supply'"
        );
        assert_eq!(SqlValue::Null.to_sql_literal(), "NULL");
        assert_eq!(SqlValue::I64(42).to_sql_literal(), "42");
        assert_eq!(SqlValue::Bool(false).to_sql_literal(), "FALSE");
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_ident("work\"order"), "\"work\"\"order\"");
        assert_eq!(qualify_table("public", "customers"), "\"public\".\"customers\"");
    }
}
