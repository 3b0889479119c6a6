//! Configuration type definitions with auto-tuning based on system resources.

use crate::normalize::{
    coerce, default_connection_aliases, default_deprecated_grades, CaseStyle, Normalizer,
    DEFAULT_ALLOWED_CHARS, DEFAULT_WORK_ORDER_WIDTH,
};
use crate::rules::{BusinessRule, Severity};
use crate::typemap::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len().max(1);

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
///
/// Every section has a serde default, so a file only needs the keys it
/// overrides. See [`Config::load`] for how a file is merged over the
/// built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Company (tenant) whose data is being migrated.
    #[serde(default)]
    pub company: String,

    /// Target store connection.
    #[serde(default)]
    pub database_config: DatabaseConfig,

    /// Column mappings keyed by logical field name.
    #[serde(default)]
    pub oil_gas_mappings: BTreeMap<String, ColumnMapping>,

    /// Table mappings keyed by legacy table name.
    #[serde(default)]
    pub table_mappings: BTreeMap<String, TableMapping>,

    #[serde(default)]
    pub processing_options: ProcessingOptions,

    #[serde(default)]
    pub validation_rules: ValidationRules,

    #[serde(default)]
    pub normalization: NormalizationConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        if self.processing_options.workers.is_none() {
            let workers = resources.cpu_cores.clamp(1, 16);
            info!("Auto-tuned workers: {}", workers);
            self.processing_options.workers = Some(workers);
        }
        self
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Explicit database name. Empty means derive from the tenant.
    #[serde(default)]
    pub database: String,

    /// Prefix for tenant-derived database names.
    #[serde(default = "default_database_prefix")]
    pub database_prefix: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Pool size upper bound.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Idle connections to keep warm between batches.
    #[serde(default = "default_idle_connections")]
    pub idle_connections: usize,

    /// Recycle connections older than this (seconds).
    #[serde(default = "default_connection_lifetime")]
    pub connection_lifetime_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_pg_port(),
            database: String::new(),
            database_prefix: default_database_prefix(),
            user: String::new(),
            password: String::new(),
            max_connections: default_max_connections(),
            idle_connections: default_idle_connections(),
            connection_lifetime_secs: default_connection_lifetime(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("database_prefix", &self.database_prefix)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("idle_connections", &self.idle_connections)
            .field("connection_lifetime_secs", &self.connection_lifetime_secs)
            .finish()
    }
}

/// Rename and rule list for one logical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Legacy header spellings that map to this field.
    #[serde(default)]
    pub source_columns: Vec<String>,

    /// Target column name.
    pub target_column: String,

    #[serde(default)]
    pub data_type: ColumnType,

    /// Value must be present (non-nullable).
    #[serde(default)]
    pub required: bool,

    /// Value used when the legacy field is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Normalizers applied in order.
    #[serde(default)]
    pub rules: Vec<Normalizer>,

    /// Severity of a normalizer failure.
    #[serde(default)]
    pub severity: Severity,
}

impl ColumnMapping {
    pub fn matches(&self, header: &str) -> bool {
        self.target_column.eq_ignore_ascii_case(header)
            || self
                .source_columns
                .iter()
                .any(|s| s.eq_ignore_ascii_case(header.trim()))
    }
}

/// Mapping of one legacy table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Target table name; empty for counter tables.
    #[serde(default)]
    pub target_table: String,

    /// Explicit column renames: legacy header to target column.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,

    /// Table only holds a running counter.
    #[serde(default)]
    pub is_counter_table: bool,

    /// Target sequence seeded from a counter table.
    #[serde(default)]
    pub sequence_name: String,

    /// Column holding the counter value; any numeric column if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_column: Option<String>,
}

impl TableMapping {
    pub fn counter(sequence_name: &str) -> Self {
        Self {
            is_counter_table: true,
            sequence_name: sequence_name.to_string(),
            ..Default::default()
        }
    }

    pub fn table(target_table: &str) -> Self {
        Self {
            target_table: target_table.to_string(),
            ..Default::default()
        }
    }
}

/// Job processing behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOptions {
    /// Number of parallel workers. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Rows per direct-insert batch and per literal INSERT statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Keep going after a table-level failure.
    #[serde(default = "default_true")]
    pub continue_on_error: bool,

    /// Run every phase except export writes.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            workers: None,
            batch_size: default_batch_size(),
            continue_on_error: true,
            dry_run: false,
        }
    }
}

impl ProcessingOptions {
    /// Get workers count (defaults to 4 when neither set nor auto-tuned).
    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(4).max(1)
    }
}

/// Structural and business-rule validation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Tables that must exist in the source export.
    #[serde(default)]
    pub required_tables: Vec<String>,

    /// Columns that must have a value, keyed by legacy table name.
    #[serde(default)]
    pub required_columns: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub business_rules: Vec<BusinessRule>,
}

/// Settings for the value normalizers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationConfig {
    #[serde(default)]
    pub customer_case: CaseStyle,

    /// Punctuation kept in customer names besides letters, digits and spaces.
    #[serde(default = "default_allowed_chars")]
    pub customer_allowed_chars: String,

    #[serde(default = "default_work_order_width")]
    pub work_order_width: usize,

    /// Accepted date formats, tried in order.
    #[serde(default = "coerce::default_date_formats")]
    pub date_formats: Vec<String>,

    /// Accepted timestamp formats, tried in order.
    #[serde(default = "coerce::default_timestamp_formats")]
    pub timestamp_formats: Vec<String>,

    /// Grades accepted in addition to the built-in dictionary.
    #[serde(default)]
    pub extra_grades: Vec<String>,

    /// Deprecated grade codes and their replacement.
    #[serde(default = "default_deprecated_grades")]
    pub deprecated_grades: BTreeMap<String, Option<String>>,

    /// Connection name variants and their code.
    #[serde(default = "default_connection_aliases")]
    pub connection_aliases: BTreeMap<String, String>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            customer_case: CaseStyle::default(),
            customer_allowed_chars: default_allowed_chars(),
            work_order_width: default_work_order_width(),
            date_formats: coerce::default_date_formats(),
            timestamp_formats: coerce::default_timestamp_formats(),
            extra_grades: Vec::new(),
            deprecated_grades: default_deprecated_grades(),
            connection_aliases: default_connection_aliases(),
        }
    }
}

/// Import-script flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlMode {
    /// `\copy` from the emitted CSV file.
    #[default]
    Copy,
    /// Literal INSERT statements.
    Insert,
}

/// Which sinks run and where files go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_true")]
    pub csv: bool,

    #[serde(default = "default_true")]
    pub sql: bool,

    /// Insert straight into the target store.
    #[serde(default)]
    pub direct: bool,

    #[serde(default)]
    pub sql_mode: SqlMode,

    /// Target schema namespace for scripts and direct inserts.
    #[serde(default = "default_public_schema")]
    pub schema: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            csv: true,
            sql: true,
            direct: false,
            sql_mode: SqlMode::default(),
            schema: default_public_schema(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_database_prefix() -> String {
    "tenant_".to_string()
}

fn default_max_connections() -> usize {
    8
}

fn default_idle_connections() -> usize {
    2
}

fn default_connection_lifetime() -> u64 {
    1800
}

fn default_batch_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_allowed_chars() -> String {
    DEFAULT_ALLOWED_CHARS.to_string()
}

fn default_work_order_width() -> usize {
    DEFAULT_WORK_ORDER_WIDTH
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
