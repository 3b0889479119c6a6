//! Typed business rules.
//!
//! Each rule is one of four kinds (`required`, `enum`, `format`, `range`),
//! carries a severity, and is evaluated by exhaustive matching on
//! [`RuleKind`]. Patterns are compiled once when the rule set is built.

use crate::error::{MigrateError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a failed check is.
///
/// Serialized as its numeric level (1 = critical, 2 = error, 3 = warning);
/// configuration files may also use the lowercase names.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "SeverityRepr", into = "u8")]
pub enum Severity {
    Critical,
    #[default]
    Error,
    Warning,
}

impl Severity {
    /// Numeric level used in reports.
    pub fn level(self) -> u8 {
        match self {
            Severity::Critical => 1,
            Severity::Error => 2,
            Severity::Warning => 3,
        }
    }

    /// Whether a failure at this severity invalidates the record.
    pub fn invalidates(self) -> bool {
        !matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        f.write_str(name)
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> u8 {
        severity.level()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeverityRepr {
    Level(u8),
    Name(String),
}

impl TryFrom<SeverityRepr> for Severity {
    type Error = String;

    fn try_from(repr: SeverityRepr) -> std::result::Result<Self, String> {
        match repr {
            SeverityRepr::Level(1) => Ok(Severity::Critical),
            SeverityRepr::Level(2) => Ok(Severity::Error),
            SeverityRepr::Level(3) => Ok(Severity::Warning),
            SeverityRepr::Level(n) => Err(format!("unknown severity level {}", n)),
            SeverityRepr::Name(name) => match name.to_lowercase().as_str() {
                "critical" => Ok(Severity::Critical),
                "error" => Ok(Severity::Error),
                "warning" | "warn" => Ok(Severity::Warning),
                other => Err(format!("unknown severity '{}'", other)),
            },
        }
    }
}

/// What a `range` rule measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeMeasure {
    /// Character count of the value.
    Length,
    /// Numeric value; non-numeric input fails.
    #[default]
    Value,
}

/// The check a business rule performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    Required,
    Enum {
        values: Vec<String>,
    },
    Format {
        pattern: String,
    },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        measure: RangeMeasure,
    },
}

/// A configured business rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    /// Unique rule name, referenced from column metadata.
    pub name: String,

    /// Source table the rule is bound to; absent or `*` means any table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Column (source or target name) the rule checks.
    pub column: String,

    #[serde(flatten)]
    pub kind: RuleKind,

    #[serde(default)]
    pub severity: Severity,

    /// Message override for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl BusinessRule {
    /// Whether the rule is bound to the given table and column.
    pub fn applies_to(&self, table: &str, source_column: &str, target_column: &str) -> bool {
        let table_matches = match self.table.as_deref() {
            None | Some("*") => true,
            Some(t) => t.eq_ignore_ascii_case(table),
        };
        table_matches
            && (self.column.eq_ignore_ascii_case(source_column)
                || self.column.eq_ignore_ascii_case(target_column))
    }
}

/// A rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: BusinessRule,
    check: Check,
}

#[derive(Debug, Clone)]
enum Check {
    Required,
    Enum(Vec<String>),
    Format(Regex),
    Range {
        min: Option<f64>,
        max: Option<f64>,
        measure: RangeMeasure,
    },
}

/// Why a rule rejected a value.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleViolation {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub suggested_fix: Option<String>,
}

impl CompiledRule {
    /// Compile a rule, validating its pattern and bounds.
    pub fn compile(rule: BusinessRule) -> Result<Self> {
        let check = match &rule.kind {
            RuleKind::Required => Check::Required,
            RuleKind::Enum { values } => {
                if values.is_empty() {
                    return Err(MigrateError::Config(format!(
                        "rule '{}': enum rule needs at least one value",
                        rule.name
                    )));
                }
                Check::Enum(values.iter().map(|v| v.trim().to_lowercase()).collect())
            }
            RuleKind::Format { pattern } => {
                let regex = Regex::new(pattern).map_err(|e| {
                    MigrateError::Config(format!(
                        "rule '{}': invalid pattern '{}': {}",
                        rule.name, pattern, e
                    ))
                })?;
                Check::Format(regex)
            }
            RuleKind::Range { min, max, measure } => {
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(MigrateError::Config(format!(
                            "rule '{}': range min {} exceeds max {}",
                            rule.name, lo, hi
                        )));
                    }
                }
                Check::Range {
                    min: *min,
                    max: *max,
                    measure: *measure,
                }
            }
        };
        Ok(Self { rule, check })
    }

    /// Whether this is a `required` rule.
    pub fn is_required(&self) -> bool {
        matches!(self.check, Check::Required)
    }

    /// Evaluate the rule against a raw (trimmed) value.
    ///
    /// Empty values only fail `required`; the other kinds treat absence as
    /// nothing to check.
    pub fn evaluate(&self, value: &str) -> Option<RuleViolation> {
        let value = value.trim();
        let failure = match &self.check {
            Check::Required => value.is_empty().then(|| "value is required".to_string()),
            _ if value.is_empty() => None,
            Check::Enum(allowed) => {
                let folded = value.to_lowercase();
                (!allowed.iter().any(|a| *a == folded)).then(|| {
                    format!("'{}' is not one of the allowed values", value)
                })
            }
            Check::Format(regex) => (!regex.is_match(value))
                .then(|| format!("'{}' does not match pattern {}", value, regex.as_str())),
            Check::Range { min, max, measure } => {
                let measured = match measure {
                    RangeMeasure::Length => Some(value.chars().count() as f64),
                    RangeMeasure::Value => value.replace(',', "").parse::<f64>().ok(),
                };
                match measured {
                    None => Some(format!("'{}' is not numeric", value)),
                    Some(n) if min.is_some_and(|lo| n < lo) || max.is_some_and(|hi| n > hi) => {
                        Some(format!(
                            "{} {} outside [{}, {}]",
                            match measure {
                                RangeMeasure::Length => "length",
                                RangeMeasure::Value => "value",
                            },
                            n,
                            min.map_or("-inf".to_string(), |v| v.to_string()),
                            max.map_or("inf".to_string(), |v| v.to_string())
                        ))
                    }
                    Some(_) => None,
                }
            }
        };

        failure.map(|detail| RuleViolation {
            rule: self.rule.name.clone(),
            severity: self.rule.severity,
            message: self.rule.message.clone().unwrap_or(detail),
            suggested_fix: self.rule.suggested_fix.clone(),
        })
    }
}
