//! Counter-table conversion to target sequences.

use crate::config::TableMapping;
use crate::extract::RawRecord;
use crate::schema::TableInfo;
use serde::{Deserialize, Serialize};

/// A sequence to create in the target schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDeclaration {
    pub name: String,
    pub source_table: String,
    /// First value the sequence hands out.
    pub start: i64,
}

/// Derive a sequence from a counter table: next value is the largest
/// observed counter plus one.
///
/// Only the configured counter column is read when set; otherwise every
/// column is scanned. Returns `None` as the max when no numeric value
/// was found. The start never drops below 1, the default sequence minimum.
pub fn counter_sequence(
    table: &TableInfo,
    mapping: &TableMapping,
    records: &[RawRecord],
) -> (SequenceDeclaration, Option<i64>) {
    let indexes: Vec<usize> = match mapping
        .counter_column
        .as_deref()
        .and_then(|name| table.column(name))
    {
        Some(column) => vec![column.index],
        None => table.columns.iter().map(|c| c.index).collect(),
    };

    let max = records
        .iter()
        .flat_map(|r| indexes.iter().map(move |i| r.get(*i)))
        .filter_map(parse_counter)
        .max();

    let declaration = SequenceDeclaration {
        name: mapping.sequence_name.clone(),
        source_table: table.original_name.clone(),
        start: max.map_or(1, |m| m.saturating_add(1).max(1)),
    };
    (declaration, max)
}

fn parse_counter(value: &str) -> Option<i64> {
    let cleaned = value.trim().replace(',', "");
    if let Ok(n) = cleaned.parse::<i64>() {
        return Some(n);
    }
    let f = cleaned.parse::<f64>().ok()?;
    (f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnInfo;
    use crate::typemap::ColumnType;
    use std::path::PathBuf;

    fn counter_table() -> TableInfo {
        let column = |name: &str, index| ColumnInfo {
            name: name.to_lowercase(),
            original_name: name.to_string(),
            index,
            original_type: ColumnType::Integer,
            target_type: ColumnType::Text,
            nullable: true,
            default: None,
            normalizers: Vec::new(),
            normalizer_severity: Default::default(),
            business_rules: Vec::new(),
            sample_values: Vec::new(),
        };
        TableInfo {
            name: String::new(),
            original_name: "tblWorkOrderCounter".to_string(),
            path: PathBuf::from("tblWorkOrderCounter.csv"),
            delimiter: b',',
            columns: vec![column("Year", 0), column("NextNum", 1)],
            record_count: 2,
            relationships: Vec::new(),
            dependencies: Vec::new(),
            priority: 0,
            is_counter_table: true,
        }
    }

    fn rows() -> Vec<RawRecord> {
        vec![
            RawRecord::new(1, vec!["2019".into(), "1,042".into()]),
            RawRecord::new(2, vec!["2020".into(), "980".into()]),
        ]
    }

    #[test]
    fn test_configured_column() {
        let mut mapping = TableMapping::counter("work_order_seq");
        mapping.counter_column = Some("nextnum".to_string());
        let (seq, max) = counter_sequence(&counter_table(), &mapping, &rows());
        assert_eq!(max, Some(1042));
        assert_eq!(seq.start, 1043);
        assert_eq!(seq.name, "work_order_seq");
        assert_eq!(seq.source_table, "tblWorkOrderCounter");
    }

    #[test]
    fn test_any_numeric_column() {
        let mapping = TableMapping::counter("work_order_seq");
        let (seq, _) = counter_sequence(&counter_table(), &mapping, &rows());
        assert_eq!(seq.start, 2021);
    }

    #[test]
    fn test_no_numeric_values_starts_at_one() {
        let mapping = TableMapping::counter("counter_seq");
        let records = vec![RawRecord::new(1, vec!["n/a".into(), "".into()])];
        let (seq, max) = counter_sequence(&counter_table(), &mapping, &records);
        assert_eq!(max, None);
        assert_eq!(seq.start, 1);
    }

    #[test]
    fn test_negative_counter_starts_at_one() {
        let mut mapping = TableMapping::counter("counter_seq");
        mapping.counter_column = Some("nextnum".to_string());
        let records = vec![RawRecord::new(1, vec!["2020".into(), "-5".into()])];
        let (seq, max) = counter_sequence(&counter_table(), &mapping, &records);
        assert_eq!(max, Some(-5));
        assert_eq!(seq.start, 1);
    }
}
