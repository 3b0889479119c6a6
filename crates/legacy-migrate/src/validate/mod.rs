//! Business-rule engine and validation statistics.

use crate::config::MappingRepository;
use crate::extract::RawRecord;
use crate::job::{ErrorType, ProcessingError};
use crate::rules::{CompiledRule, Severity};
use crate::schema::TableInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pass/fail counters and the derived data-quality score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total_validations: u64,
    pub passed: u64,
    pub failed: u64,
    pub errors_by_type: BTreeMap<String, u64>,
    pub errors_by_table: BTreeMap<String, u64>,
    pub critical_errors: u64,
    pub business_rule_violations: u64,
    pub quality_score: f64,
}

impl ValidationStats {
    /// Count one record's outcome and the failures recorded against it.
    pub fn record(&mut self, table: &str, valid: bool, errors: &[ProcessingError]) {
        self.total_validations += 1;
        if valid {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.count_errors(table, errors);
        self.recompute_score();
    }

    /// Count failures not tied to a record outcome (extraction, export).
    pub fn record_errors(&mut self, table: &str, errors: &[ProcessingError]) {
        self.count_errors(table, errors);
        self.recompute_score();
    }

    fn count_errors(&mut self, table: &str, errors: &[ProcessingError]) {
        for error in errors {
            *self
                .errors_by_type
                .entry(error.error_type.to_string())
                .or_insert(0) += 1;
            *self.errors_by_table.entry(table.to_string()).or_insert(0) += 1;
            if error.severity == Severity::Critical {
                self.critical_errors += 1;
            }
            if error.error_type == ErrorType::BusinessRule {
                self.business_rule_violations += 1;
            }
        }
    }

    /// Add another set of counters.
    pub fn merge(&mut self, other: &ValidationStats) {
        self.total_validations += other.total_validations;
        self.passed += other.passed;
        self.failed += other.failed;
        for (k, v) in &other.errors_by_type {
            *self.errors_by_type.entry(k.clone()).or_insert(0) += v;
        }
        for (k, v) in &other.errors_by_table {
            *self.errors_by_table.entry(k.clone()).or_insert(0) += v;
        }
        self.critical_errors += other.critical_errors;
        self.business_rule_violations += other.business_rule_violations;
        self.recompute_score();
    }

    pub fn recompute_score(&mut self) {
        self.quality_score = quality_score(
            self.passed,
            self.total_validations,
            self.critical_errors,
            self.business_rule_violations,
        );
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total_validations == 0 {
            return 1.0;
        }
        self.passed as f64 / self.total_validations as f64
    }
}

/// `clamp(0, 100, passRate * 100 - critical * 5 - violations * 2)`.
///
/// With nothing validated the pass rate is taken as 1.
pub fn quality_score(passed: u64, total: u64, critical: u64, violations: u64) -> f64 {
    let pass_rate = if total == 0 {
        1.0
    } else {
        passed as f64 / total as f64
    };
    (pass_rate * 100.0 - critical as f64 * 5.0 - violations as f64 * 2.0).clamp(0.0, 100.0)
}

/// Rule checks for one record.
#[derive(Debug, Clone, Default)]
pub struct RecordCheck {
    pub errors: Vec<ProcessingError>,
}

impl RecordCheck {
    pub fn is_valid(&self) -> bool {
        !self.errors.iter().any(ProcessingError::invalidates)
    }
}

/// Applies required-value checks and business rules to raw records of one table.
pub struct Validator<'a> {
    table: &'a TableInfo,
    rules: Vec<Vec<&'a CompiledRule>>,
}

impl<'a> Validator<'a> {
    pub fn new(repo: &'a MappingRepository, table: &'a TableInfo) -> Self {
        let rules = table
            .columns
            .iter()
            .map(|c| repo.rules_for(&table.original_name, &c.original_name, &c.name))
            .collect();
        Self { table, rules }
    }

    /// Check one raw record.
    ///
    /// A missing value in a column that requires one yields a single
    /// `validation` error and suppresses the column's other rules. Every
    /// failing rule is reported, in declaration order.
    pub fn validate(&self, record: &RawRecord) -> RecordCheck {
        let mut check = RecordCheck::default();
        for (column, rules) in self.table.columns.iter().zip(&self.rules) {
            let value = record.get(column.index).trim();

            if value.is_empty() && column.requires_value() {
                check.errors.push(
                    ProcessingError::new(
                        ErrorType::Validation,
                        Severity::Error,
                        format!("required field '{}' is empty", column.original_name),
                    )
                    .table(&self.table.original_name)
                    .record(record.number)
                    .field(&column.name)
                    .suggested_fix(Some(format!(
                        "supply a value for '{}' in the legacy record",
                        column.original_name
                    ))),
                );
                continue;
            }

            for rule in rules {
                if let Some(violation) = rule.evaluate(value) {
                    check.errors.push(
                        ProcessingError::new(
                            ErrorType::BusinessRule,
                            violation.severity,
                            format!("{}: {}", violation.rule, violation.message),
                        )
                        .table(&self.table.original_name)
                        .record(record.number)
                        .field(&column.name)
                        .value(value)
                        .suggested_fix(violation.suggested_fix),
                    );
                }
            }
        }
        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::rules::{BusinessRule, RuleKind};
    use crate::schema::SchemaAnalyzer;
    use proptest::prelude::*;
    use std::fs;

    fn rule(name: &str, column: &str, kind: RuleKind, severity: Severity) -> BusinessRule {
        BusinessRule {
            name: name.to_string(),
            table: None,
            column: column.to_string(),
            kind,
            severity,
            message: None,
            suggested_fix: None,
        }
    }

    fn analyze(config: Config, files: &[(&str, &str)]) -> (MappingRepository, TableInfo) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let repo = MappingRepository::new(config).unwrap();
        let plan = SchemaAnalyzer::new(&repo).analyze(dir.path()).unwrap();
        let table = plan.tables[0].clone();
        (repo, table)
    }

    #[test]
    fn test_missing_required_value() {
        let (repo, table) = analyze(
            Config::builtin(),
            &[("tblCustomer.csv", "CustName,City\nAcme,Houston\n,Odessa\n")],
        );
        let validator = Validator::new(&repo, &table);
        let ok = validator.validate(&RawRecord::new(1, vec!["Acme".into(), "Houston".into()]));
        assert!(ok.is_valid());

        let bad = validator.validate(&RawRecord::new(2, vec!["".into(), "Odessa".into()]));
        assert!(!bad.is_valid());
        assert_eq!(bad.errors.len(), 1);
        assert_eq!(bad.errors[0].severity, Severity::Error);
        assert_eq!(bad.errors[0].error_type, ErrorType::Validation);
        assert_eq!(bad.errors[0].record, Some(2));
    }

    #[test]
    fn test_overlapping_rules_all_reported() {
        let mut config = Config::builtin();
        config.validation_rules.business_rules = vec![
            rule(
                "grade_known",
                "grade",
                RuleKind::Enum {
                    values: vec!["J55".into(), "L80".into()],
                },
                Severity::Error,
            ),
            rule(
                "grade_short",
                "grade",
                RuleKind::Range {
                    min: None,
                    max: Some(3.0),
                    measure: crate::rules::RangeMeasure::Length,
                },
                Severity::Warning,
            ),
        ];
        let (repo, table) = analyze(config, &[("tblInventory.csv", "Grade\nP-110\n")]);
        let validator = Validator::new(&repo, &table);
        let check = validator.validate(&RawRecord::new(1, vec!["P-110".into()]));
        let names: Vec<&str> = check
            .errors
            .iter()
            .map(|e| e.description.split(':').next().unwrap())
            .collect();
        assert_eq!(names, vec!["grade_known", "grade_short"]);
        assert!(!check.is_valid());
    }

    #[test]
    fn test_warning_rule_keeps_record_valid() {
        let mut config = Config::builtin();
        config.validation_rules.business_rules = vec![rule(
            "wo_format",
            "work_order",
            RuleKind::Format {
                pattern: "^[A-Z]{2}-[0-9]{6}$".into(),
            },
            Severity::Warning,
        )];
        let (repo, table) = analyze(config, &[("tblWorkOrder.csv", "WorkOrder\nlb 1001\n")]);
        let validator = Validator::new(&repo, &table);
        let check = validator.validate(&RawRecord::new(1, vec!["lb 1001".into()]));
        assert_eq!(check.errors.len(), 1);
        assert_eq!(check.errors[0].error_type, ErrorType::BusinessRule);
        assert!(check.is_valid());
    }

    #[test]
    fn test_stats_and_score() {
        let mut stats = ValidationStats::default();
        stats.record("t", true, &[]);
        stats.record("t", true, &[]);
        let br = ProcessingError::new(ErrorType::BusinessRule, Severity::Error, "x");
        stats.record("t", false, &[br]);
        assert_eq!(stats.total_validations, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.business_rule_violations, 1);
        assert!((stats.quality_score - (200.0 / 3.0 - 2.0)).abs() < 1e-9);
        assert_eq!(stats.errors_by_type["business_rule"], 1);

        let mut total = ValidationStats::default();
        total.merge(&stats);
        total.merge(&stats);
        assert_eq!(total.total_validations, 6);
        assert!((total.quality_score - (200.0 / 3.0 - 4.0)).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_score_bounded_and_monotonic(
            total in 1u64..500,
            passed_frac in 0.0f64..=1.0,
            critical in 0u64..40,
            violations in 0u64..80,
        ) {
            let passed = (total as f64 * passed_frac) as u64;
            let score = quality_score(passed, total, critical, violations);
            prop_assert!((0.0..=100.0).contains(&score));
            prop_assert!(quality_score(passed, total, critical + 1, violations) <= score);
            prop_assert!(quality_score(passed, total, critical, violations + 1) <= score);
        }
    }
}
