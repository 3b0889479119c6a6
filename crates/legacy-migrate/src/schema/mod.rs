//! Source export discovery and table metadata.

mod analyzer;
mod plan;

pub use analyzer::{SchemaAnalyzer, SAMPLE_SIZE};
pub use plan::{infer_relationships, ProcessingPlan};

use crate::normalize::Normalizer;
use crate::rules::Severity;
use crate::typemap::ColumnType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata of one legacy column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Target column name.
    pub name: String,

    /// Header as it appears in the export (synthesized when blank).
    pub original_name: String,

    /// Position in the source row.
    pub index: usize,

    /// Type guessed from sample values.
    pub original_type: ColumnType,

    /// Type values are coerced to.
    pub target_type: ColumnType,

    pub nullable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Normalizers applied by the transformer, in order.
    #[serde(default)]
    pub normalizers: Vec<Normalizer>,

    /// Severity of a normalizer failure on this column.
    #[serde(default)]
    pub normalizer_severity: Severity,

    /// Names of the business rules bound to this column.
    #[serde(default)]
    pub business_rules: Vec<String>,

    #[serde(default)]
    pub sample_values: Vec<String>,
}

impl ColumnInfo {
    /// A value is required when the column is not nullable and has no default.
    pub fn requires_value(&self) -> bool {
        !self.nullable && self.default.is_none()
    }
}

/// A foreign-key-like reference inferred from a column name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Column holding the reference (original header).
    pub column: String,
    /// Source name of the referenced table.
    pub references: String,
}

/// Metadata of one legacy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Target table name (empty for counter tables).
    pub name: String,

    /// Source table name (the file stem).
    pub original_name: String,

    pub path: PathBuf,

    pub delimiter: u8,

    pub columns: Vec<ColumnInfo>,

    /// Data rows, header excluded.
    pub record_count: u64,

    pub relationships: Vec<Relationship>,

    /// Source names of tables that must be processed first.
    pub dependencies: Vec<String>,

    /// Dependency level; lower runs first.
    pub priority: usize,

    pub is_counter_table: bool,
}

impl TableInfo {
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| {
            c.original_name.eq_ignore_ascii_case(name) || c.name.eq_ignore_ascii_case(name)
        })
    }
}
