//! Column renaming, value normalization and type coercion.

mod columns;
mod counter;

pub use columns::{normalize_identifier, target_columns};
pub use counter::{counter_sequence, SequenceDeclaration};

use crate::extract::RawRecord;
use crate::job::{ErrorType, ProcessingError};
use crate::normalize::NormalizerSet;
use crate::rules::Severity;
use crate::schema::{ColumnInfo, TableInfo};
use crate::target::SqlValue;

/// A record in target form.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRecord {
    pub number: u64,
    pub values: Vec<SqlValue>,
    pub errors: Vec<ProcessingError>,
}

impl TransformedRecord {
    pub fn is_valid(&self) -> bool {
        !self.errors.iter().any(ProcessingError::invalidates)
    }
}

/// Turns raw records of one table into typed target rows.
pub struct Transformer<'a> {
    normalizers: &'a NormalizerSet,
    table: &'a TableInfo,
}

impl<'a> Transformer<'a> {
    pub fn new(normalizers: &'a NormalizerSet, table: &'a TableInfo) -> Self {
        Self { normalizers, table }
    }

    pub fn transform(&self, record: &RawRecord) -> TransformedRecord {
        let mut errors = Vec::new();
        let values = self
            .table
            .columns
            .iter()
            .map(|column| self.transform_value(column, record, &mut errors))
            .collect();
        TransformedRecord {
            number: record.number,
            values,
            errors,
        }
    }

    /// Empty values take the column default or become NULL; missing
    /// required values are the validator's concern.
    fn transform_value(
        &self,
        column: &ColumnInfo,
        record: &RawRecord,
        errors: &mut Vec<ProcessingError>,
    ) -> SqlValue {
        let raw = record.get(column.index).trim();
        let raw = if raw.is_empty() {
            match column.default.as_deref() {
                Some(default) => default,
                None => return SqlValue::Null,
            }
        } else {
            raw
        };

        let error = |severity: Severity, description: String| {
            ProcessingError::new(ErrorType::Transformation, severity, description)
                .table(&self.table.original_name)
                .record(record.number)
                .field(&column.name)
                .value(raw)
        };

        let normalized = match self.normalizers.apply_all(&column.normalizers, raw) {
            Ok((value, warnings)) => {
                for warning in warnings {
                    errors.push(error(Severity::Warning, warning));
                }
                value
            }
            Err(e) => {
                let severity = column.normalizer_severity;
                errors.push(error(severity, e.message).suggested_fix(e.suggested_fix));
                if severity.invalidates() {
                    return SqlValue::Null;
                }
                raw.to_string()
            }
        };

        match self.normalizers.coercer().coerce(&normalized, column.target_type) {
            Ok(value) => value,
            Err(e) => {
                let severity = if column.nullable {
                    Severity::Warning
                } else {
                    Severity::Error
                };
                errors.push(error(
                    severity,
                    format!("cannot convert to {}: {}", column.target_type, e.message),
                ));
                SqlValue::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MappingRepository, NormalizationConfig};
    use crate::schema::SchemaAnalyzer;
    use chrono::NaiveDate;
    use std::fs;

    fn table(header: &str) -> TableInfo {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tblWorkOrder.csv"), format!("{}\n", header)).unwrap();
        let repo = MappingRepository::new(Config::builtin()).unwrap();
        SchemaAnalyzer::new(&repo).analyze(dir.path()).unwrap().tables[0].clone()
    }

    fn raw(values: &[&str]) -> RawRecord {
        RawRecord::new(7, values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_normalizes_and_coerces() {
        let table = table("CustName,Grade,Size,WO,OrderDate,Qty,Active,Remarks");
        let set = NormalizerSet::new(&NormalizationConfig::default()).unwrap();
        let out = Transformer::new(&set, &table).transform(&raw(&[
            "  acme   tubulars ",
            "l-80",
            "5.5",
            "lb 1001",
            "03/07/2019",
            "1,200",
            "",
            " left at yard ",
        ]));
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(
            out.values,
            vec![
                SqlValue::Text("Acme Tubulars".into()),
                SqlValue::Text("L80".into()),
                SqlValue::Text("5 1/2\"".into()),
                SqlValue::Text("LB-001001".into()),
                SqlValue::Date(NaiveDate::from_ymd_opt(2019, 3, 7).unwrap()),
                SqlValue::I64(1200),
                SqlValue::Bool(true),
                SqlValue::Text("left at yard".into()),
            ]
        );
    }

    #[test]
    fn test_unknown_grade_invalidates() {
        let table = table("Grade");
        let set = NormalizerSet::new(&NormalizationConfig::default()).unwrap();
        let out = Transformer::new(&set, &table).transform(&raw(&["X99"]));
        assert!(!out.is_valid());
        assert_eq!(out.values, vec![SqlValue::Null]);
        assert_eq!(out.errors[0].error_type, ErrorType::Transformation);
        assert_eq!(out.errors[0].record, Some(7));
    }

    #[test]
    fn test_warning_severity_keeps_record() {
        let table = table("Phone,Connection");
        let set = NormalizerSet::new(&NormalizationConfig::default()).unwrap();
        let out = Transformer::new(&set, &table).transform(&raw(&["12", "Wedge 521"]));
        assert!(out.is_valid());
        assert_eq!(out.errors.len(), 2);
        assert!(out.errors.iter().all(|e| e.severity == Severity::Warning));
        assert_eq!(out.values[1], SqlValue::Text("Wedge 521".into()));
    }

    #[test]
    fn test_nullable_coercion_failure_is_warning() {
        let table = table("Qty");
        let set = NormalizerSet::new(&NormalizationConfig::default()).unwrap();
        let out = Transformer::new(&set, &table).transform(&raw(&["lots"]));
        assert!(out.is_valid());
        assert_eq!(out.values, vec![SqlValue::Null]);
        assert_eq!(out.errors[0].severity, Severity::Warning);
    }

    #[test]
    fn test_empty_required_value_is_null_without_error() {
        let table = table("CustName");
        let set = NormalizerSet::new(&NormalizationConfig::default()).unwrap();
        let out = Transformer::new(&set, &table).transform(&raw(&[""]));
        assert!(out.errors.is_empty());
        assert_eq!(out.values, vec![SqlValue::Null]);
    }
}
