//! Final job report and console summary.

use crate::error::Result;
use crate::job::{
    CompletedJob, ErrorType, JobStatus, PerformanceStats, ProcessingError, TableStats,
};
use crate::transform::SequenceDeclaration;
use crate::validate::ValidationStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Critical errors listed in the console summary.
const MAX_CRITICAL_SHOWN: usize = 5;

/// Record counts of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
}

/// A produced file as listed in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Machine-readable summary of a completed job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub company: String,
    pub status: JobStatus,
    pub source: PathBuf,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub config_hash: String,
    pub records: RecordCounts,
    pub success_rate: f64,
    pub table_stats: BTreeMap<String, TableStats>,
    pub validation_stats: ValidationStats,
    pub errors: Vec<ProcessingError>,
    pub error_counts_by_type: BTreeMap<ErrorType, u64>,
    pub sequences: Vec<SequenceDeclaration>,
    pub output_files: Vec<ReportFile>,
    pub performance: Option<PerformanceStats>,
}

impl JobReport {
    pub fn from_job(job: &CompletedJob) -> Self {
        Self {
            job_id: job.id.clone(),
            company: job.company.clone(),
            status: job.status,
            source: job.source.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            duration_seconds: job.duration_seconds(),
            config_hash: job.config_hash.clone(),
            records: RecordCounts {
                total: job.records_total,
                valid: job.records_valid,
                invalid: job.records_invalid,
            },
            success_rate: job.success_rate(),
            table_stats: job.table_stats.clone(),
            validation_stats: job.validation_stats.clone(),
            errors: job.errors.clone(),
            error_counts_by_type: job.error_counts_by_type(),
            sequences: job.sequences.clone(),
            output_files: job
                .output_files
                .iter()
                .map(|f| ReportFile {
                    path: f.path.clone(),
                    bytes: f.bytes,
                })
                .collect(),
            performance: job.performance.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

/// Default location of the report for a job.
pub fn report_path(output_dir: &Path, job_id: &str) -> PathBuf {
    output_dir.join(format!("{}_report.json", job_id))
}

/// Process exit status for a finished job: 0 only if nothing was recorded.
pub fn exit_status(job: &CompletedJob) -> u8 {
    if job.errors.is_empty() {
        0
    } else {
        1
    }
}

/// Human-readable summary for the terminal.
pub fn console_summary(job: &CompletedJob) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Conversion job {}", job.id);
    let _ = writeln!(out, "  Company:      {}", job.company);
    let _ = writeln!(out, "  Status:       {}", job.status);
    let _ = writeln!(out, "  Duration:     {:.2}s", job.duration_seconds());
    let _ = writeln!(
        out,
        "  Records:      {} total, {} valid, {} invalid",
        job.records_total, job.records_valid, job.records_invalid
    );
    let _ = writeln!(out, "  Success rate: {:.1}%", job.success_rate());
    let _ = writeln!(
        out,
        "  Quality:      {:.1}",
        job.validation_stats.quality_score
    );
    if let Some(performance) = &job.performance {
        let _ = writeln!(
            out,
            "  Throughput:   {:.0} records/s with {} workers",
            performance.records_per_second, performance.workers
        );
    }

    let counts = job.error_counts_by_type();
    if !counts.is_empty() {
        out.push_str("\nErrors by type:\n");
        for (error_type, count) in &counts {
            let _ = writeln!(out, "  {:<16} {}", error_type.to_string(), count);
        }
    }

    let critical: Vec<&ProcessingError> =
        job.errors.iter().filter(|e| e.is_critical()).collect();
    if !critical.is_empty() {
        out.push_str("\nCritical errors:\n");
        for error in critical.iter().take(MAX_CRITICAL_SHOWN) {
            let _ = writeln!(out, "  {}", error);
        }
        if critical.len() > MAX_CRITICAL_SHOWN {
            let _ = writeln!(
                out,
                "  ... and {} more",
                critical.len() - MAX_CRITICAL_SHOWN
            );
        }
    }

    if !job.sequences.is_empty() {
        out.push_str("\nSequences:\n");
        for sequence in &job.sequences {
            let _ = writeln!(
                out,
                "  {} starts at {} (from {})",
                sequence.name, sequence.start, sequence.source_table
            );
        }
    }

    if !job.output_files.is_empty() {
        out.push_str("\nOutput files:\n");
        for file in &job.output_files {
            let _ = writeln!(out, "  {} ({} bytes)", file.path.display(), file.bytes);
        }
    }
    out
}
