//! Conversion job state and its accumulation API.
//!
//! A [`ConversionJob`] is owned by exactly one task at a time: the
//! orchestrator creates it, the aggregator mutates it while workers run,
//! and [`ConversionJob::complete`] freezes it into a [`CompletedJob`].

use crate::rules::Severity;
use crate::transform::SequenceDeclaration;
use crate::validate::ValidationStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Job lifecycle. Variants are ordered; a job only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Initializing,
    Analyzing,
    Extracting,
    Validating,
    Transforming,
    Exporting,
    Completed,
    CompletedWithWarnings,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithWarnings | JobStatus::Failed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Initializing => "initializing",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Extracting => "extracting",
            JobStatus::Validating => "validating",
            JobStatus::Transforming => "transforming",
            JobStatus::Exporting => "exporting",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithWarnings => "completed_with_warnings",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Validation,
    Transformation,
    BusinessRule,
    Extraction,
    Export,
    Critical,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorType::Validation => "validation",
            ErrorType::Transformation => "transformation",
            ErrorType::BusinessRule => "business_rule",
            ErrorType::Extraction => "extraction",
            ErrorType::Export => "export",
            ErrorType::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One recorded failure with its full context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingError {
    /// Filled in by the job when the error is attached.
    #[serde(default)]
    pub job_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// 1-based data row number within the source table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    pub error_type: ErrorType,
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,

    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl ProcessingError {
    pub fn new(error_type: ErrorType, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            job_id: String::new(),
            table: None,
            record: None,
            field: None,
            value: None,
            error_type,
            description: description.into(),
            suggested_fix: None,
            severity,
            timestamp: Utc::now(),
        }
    }

    /// A job-aborting failure.
    pub fn critical(description: impl Into<String>) -> Self {
        Self::new(ErrorType::Critical, Severity::Critical, description)
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn record(mut self, record: u64) -> Self {
        self.record = Some(record);
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn suggested_fix(mut self, fix: Option<String>) -> Self {
        self.suggested_fix = fix;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Whether this failure makes its record invalid.
    pub fn invalidates(&self) -> bool {
        self.severity.invalidates()
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.error_type)?;
        if let Some(table) = &self.table {
            write!(f, "{}", table)?;
            if let Some(record) = self.record {
                write!(f, " row {}", record)?;
            }
            if let Some(field) = &self.field {
                write!(f, " {}", field)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}", self.description)
    }
}

/// Outcome of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Pending,
    Completed,
    /// Finished, but a sink failed or some records were rejected.
    Degraded,
    /// Zero data rows, or not dispatched after a halt.
    Skipped,
    /// Counter table converted to a sequence.
    Sequence,
    Failed,
}

/// Per-table statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub table: String,
    pub target_table: String,
    pub status: TableStatus,
    pub records_total: u64,
    pub records_valid: u64,
    pub records_invalid: u64,
    /// Rows dropped by the extractor because they could not be parsed.
    pub rows_skipped: u64,
    pub errors: u64,
    pub warnings: u64,
    pub duration_ms: u64,
}

impl TableStats {
    pub fn new(table: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            target_table: target_table.into(),
            status: TableStatus::Pending,
            records_total: 0,
            records_valid: 0,
            records_invalid: 0,
            rows_skipped: 0,
            errors: 0,
            warnings: 0,
            duration_ms: 0,
        }
    }
}

/// Wall-clock time spent in each phase, summed over tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub analyze_ms: u64,
    pub extract_ms: u64,
    pub validate_ms: u64,
    pub transform_ms: u64,
    pub export_ms: u64,
    pub total_ms: u64,
    pub records_per_second: f64,
    pub workers: usize,
}

impl PerformanceStats {
    /// Add another table's phase timings.
    pub fn absorb(&mut self, other: &PhaseTimings) {
        self.extract_ms += other.extract_ms;
        self.validate_ms += other.validate_ms;
        self.transform_ms += other.transform_ms;
        self.export_ms += other.export_ms;
    }
}

/// Phase timings measured by one worker for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    pub extract_ms: u64,
    pub validate_ms: u64,
    pub transform_ms: u64,
    pub export_ms: u64,
}

/// Kind of file a sink produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Csv,
    Sql,
}

/// A file written by an exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub kind: OutputKind,
}

impl OutputFile {
    /// Describe a file that already exists on disk.
    pub fn from_path(path: impl Into<PathBuf>, kind: OutputKind) -> std::io::Result<Self> {
        let path = path.into();
        let bytes = std::fs::metadata(&path)?.len();
        Ok(Self { path, bytes, kind })
    }
}

/// Accumulating state of one conversion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: String,
    pub source: PathBuf,
    pub company: String,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub records_total: u64,
    pub records_valid: u64,
    pub records_invalid: u64,
    pub table_stats: BTreeMap<String, TableStats>,
    pub validation_stats: ValidationStats,
    pub errors: Vec<ProcessingError>,
    pub output_files: Vec<OutputFile>,
    pub sequences: Vec<SequenceDeclaration>,
    pub performance: Option<PerformanceStats>,
}

impl ConversionJob {
    pub fn new(source: &Path, company: &str, config_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.to_path_buf(),
            company: company.to_string(),
            config_hash,
            started_at: Utc::now(),
            completed_at: None,
            status: JobStatus::Initializing,
            records_total: 0,
            records_valid: 0,
            records_invalid: 0,
            table_stats: BTreeMap::new(),
            validation_stats: ValidationStats::default(),
            errors: Vec::new(),
            output_files: Vec::new(),
            sequences: Vec::new(),
            performance: None,
        }
    }

    /// Move to a later phase. Earlier or terminal targets are ignored.
    pub fn advance(&mut self, next: JobStatus) {
        if next.is_terminal() || next <= self.status {
            return;
        }
        self.status = next;
    }

    pub fn add_error(&mut self, mut error: ProcessingError) {
        error.job_id = self.id.clone();
        self.errors.push(error);
    }

    pub fn add_errors(&mut self, errors: impl IntoIterator<Item = ProcessingError>) {
        for error in errors {
            self.add_error(error);
        }
    }

    /// Record the final statistics of a table; data tables add to the job totals.
    pub fn record_table(&mut self, stats: TableStats) {
        if !matches!(stats.status, TableStatus::Sequence | TableStatus::Skipped) {
            self.records_total += stats.records_total;
            self.records_valid += stats.records_valid;
            self.records_invalid += stats.records_invalid;
        }
        self.table_stats.insert(stats.table.clone(), stats);
    }

    pub fn merge_validation(&mut self, stats: &ValidationStats) {
        self.validation_stats.merge(stats);
    }

    pub fn add_outputs(&mut self, files: impl IntoIterator<Item = OutputFile>) {
        self.output_files.extend(files);
    }

    pub fn add_sequence(&mut self, sequence: SequenceDeclaration) {
        self.sequences.push(sequence);
    }

    pub fn set_performance(&mut self, performance: PerformanceStats) {
        self.performance = Some(performance);
    }

    pub fn has_critical(&self) -> bool {
        self.errors.iter().any(ProcessingError::is_critical)
    }

    /// Error counts keyed by error type.
    pub fn error_counts_by_type(&self) -> BTreeMap<ErrorType, u64> {
        let mut counts = BTreeMap::new();
        for error in &self.errors {
            *counts.entry(error.error_type).or_insert(0) += 1;
        }
        counts
    }

    /// Fraction of data records that were valid, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.records_total == 0 {
            return 0.0;
        }
        self.records_valid as f64 / self.records_total as f64 * 100.0
    }

    pub fn duration_seconds(&self) -> f64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Settle the terminal status and freeze the job.
    pub fn complete(mut self) -> CompletedJob {
        self.status = if self.has_critical() {
            JobStatus::Failed
        } else if !self.errors.is_empty() {
            JobStatus::CompletedWithWarnings
        } else {
            JobStatus::Completed
        };
        self.completed_at = Some(Utc::now());
        CompletedJob(self)
    }
}

/// A finished job. Read-only.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct CompletedJob(ConversionJob);

impl Deref for CompletedJob {
    type Target = ConversionJob;

    fn deref(&self) -> &ConversionJob {
        &self.0
    }
}
