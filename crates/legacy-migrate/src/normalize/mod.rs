//! Value-level normalizers for oil-and-gas domain fields.
//!
//! Each normalizer turns a raw legacy value into its canonical form or
//! rejects it. [`NormalizerSet`] owns one configured instance of each and
//! dispatches on the [`Normalizer`] kinds listed in a column's mapping.

pub mod coerce;
mod connection;
mod contact;
mod customer;
mod grade;
mod size;
mod work_order;

pub use coerce::TypeCoercer;
pub use connection::{default_connection_aliases, ConnectionNormalizer, CONNECTION_ALIASES};
pub use contact::{EmailNormalizer, PhoneNormalizer};
pub use customer::{CaseStyle, CustomerNameNormalizer, DEFAULT_ALLOWED_CHARS};
pub use grade::{default_deprecated_grades, GradeNormalizer, CANONICAL_GRADES, DEPRECATED_GRADES};
pub use size::{SizeNormalizer, SIZE_TABLE};
pub use work_order::{
    WorkOrderNormalizer, DEFAULT_WIDTH as DEFAULT_WORK_ORDER_WIDTH, MAX_WIDTH as MAX_WORK_ORDER_WIDTH,
};

use crate::config::NormalizationConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A value normalizer that can be attached to a column mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalizer {
    Trim,
    Upper,
    Lower,
    Grade,
    Size,
    Connection,
    CustomerName,
    WorkOrder,
    Phone,
    Email,
}

/// Successful normalization, possibly with a non-fatal warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub value: String,
    pub warning: Option<String>,
}

impl Normalized {
    pub fn clean(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            warning: None,
        }
    }
}

/// A value that has no canonical form.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct NormalizeError {
    pub message: String,
    pub suggested_fix: Option<String>,
}

impl NormalizeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggested_fix: None,
        }
    }

    pub fn with_fix(message: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggested_fix: Some(fix.into()),
        }
    }
}

/// Configured instances of every normalizer.
#[derive(Debug, Clone)]
pub struct NormalizerSet {
    grade: GradeNormalizer,
    size: SizeNormalizer,
    connection: ConnectionNormalizer,
    customer: CustomerNameNormalizer,
    work_order: WorkOrderNormalizer,
    phone: PhoneNormalizer,
    email: EmailNormalizer,
    coercer: TypeCoercer,
}

impl NormalizerSet {
    /// Build every normalizer from the `normalization` options.
    pub fn new(config: &NormalizationConfig) -> crate::error::Result<Self> {
        Ok(Self {
            grade: GradeNormalizer::new(&config.extra_grades, &config.deprecated_grades),
            size: SizeNormalizer,
            connection: ConnectionNormalizer::new(&config.connection_aliases),
            customer: CustomerNameNormalizer::new(
                config.customer_case,
                &config.customer_allowed_chars,
            ),
            work_order: WorkOrderNormalizer::new(config.work_order_width)?,
            phone: PhoneNormalizer,
            email: EmailNormalizer::new(),
            coercer: TypeCoercer::new(
                config.date_formats.clone(),
                config.timestamp_formats.clone(),
            ),
        })
    }

    /// Apply one normalizer to a non-empty value.
    pub fn apply(&self, normalizer: Normalizer, value: &str) -> Result<Normalized, NormalizeError> {
        match normalizer {
            Normalizer::Trim => Ok(Normalized::clean(value.trim())),
            Normalizer::Upper => Ok(Normalized::clean(value.trim().to_uppercase())),
            Normalizer::Lower => Ok(Normalized::clean(value.trim().to_lowercase())),
            Normalizer::Grade => self.grade.normalize(value).map(Normalized::clean),
            Normalizer::Size => self.size.normalize(value).map(Normalized::clean),
            Normalizer::Connection => Ok(self.connection.normalize(value)),
            Normalizer::CustomerName => self.customer.normalize(value).map(Normalized::clean),
            Normalizer::WorkOrder => self.work_order.normalize(value).map(Normalized::clean),
            Normalizer::Phone => self.phone.normalize(value).map(Normalized::clean),
            Normalizer::Email => self.email.normalize(value).map(Normalized::clean),
        }
    }

    /// Apply a chain of normalizers, stopping at the first failure.
    ///
    /// Warnings from every step are collected.
    pub fn apply_all(
        &self,
        normalizers: &[Normalizer],
        value: &str,
    ) -> Result<(String, Vec<String>), NormalizeError> {
        let mut current = value.to_string();
        let mut warnings = Vec::new();
        for normalizer in normalizers {
            let out = self.apply(*normalizer, &current)?;
            if let Some(w) = out.warning {
                warnings.push(w);
            }
            current = out.value;
        }
        Ok((current, warnings))
    }

    pub fn coercer(&self) -> &TypeCoercer {
        &self.coercer
    }
}
