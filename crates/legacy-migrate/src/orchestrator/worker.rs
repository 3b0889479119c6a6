//! Per-table work units and the messages workers send to the aggregator.

use crate::config::MappingRepository;
use crate::export::{ExportSet, ExportTable, SinkFailure, TableExport};
use crate::extract::{Extractor, SkippedRow};
use crate::job::{
    ErrorType, JobStatus, OutputFile, PhaseTimings, ProcessingError, TableStats, TableStatus,
};
use crate::normalize::NormalizerSet;
use crate::rules::Severity;
use crate::schema::TableInfo;
use crate::target::SqlValue;
use crate::transform::{counter_sequence, target_columns, SequenceDeclaration, Transformer};
use crate::validate::{ValidationStats, Validator};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Progress of a job, streamed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub phase: JobStatus,
    pub records_processed: u64,
    pub records_total: u64,
    pub tables_completed: usize,
    pub tables_total: usize,
}

impl ProgressUpdate {
    pub fn phase(phase: JobStatus, tables_total: usize) -> Self {
        Self {
            job_id: String::new(),
            table: None,
            phase,
            records_processed: 0,
            records_total: 0,
            tables_completed: 0,
            tables_total,
        }
    }

    fn table(table: &TableInfo, phase: JobStatus, processed: u64, tables_total: usize) -> Self {
        Self {
            table: Some(table.original_name.clone()),
            records_processed: processed,
            records_total: table.record_count,
            ..Self::phase(phase, tables_total)
        }
    }
}

/// One table to process.
#[derive(Debug, Clone)]
pub struct WorkerJob {
    pub table: TableInfo,
}

/// Everything a worker learned about its table.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub stats: TableStats,
    pub validation: ValidationStats,
    pub sequence: Option<SequenceDeclaration>,
    pub outputs: Vec<OutputFile>,
    pub timings: PhaseTimings,
}

impl WorkerResult {
    pub fn new(stats: TableStats) -> Self {
        Self {
            stats,
            validation: ValidationStats::default(),
            sequence: None,
            outputs: Vec::new(),
            timings: PhaseTimings::default(),
        }
    }

    /// A table that was never processed.
    pub fn skipped(table: &TableInfo) -> Self {
        let mut stats = TableStats::new(&table.original_name, &table.name);
        stats.status = TableStatus::Skipped;
        stats.records_total = table.record_count;
        Self::new(stats)
    }
}

/// Messages on the aggregator's inbound channel.
#[derive(Debug)]
pub enum WorkerEvent {
    Progress(ProgressUpdate),
    Error(ProcessingError),
    Finished(Box<WorkerResult>),
    /// Files produced outside any single table (sequence scripts).
    Outputs(Vec<OutputFile>),
}

/// Shared, read-only state of every worker in a job.
pub struct WorkerContext {
    pub repo: Arc<MappingRepository>,
    pub normalizers: Arc<NormalizerSet>,
    pub exports: ExportSet,
    pub extractor: Extractor,
    /// Valid rows handed to the sinks at a time.
    pub batch_size: usize,
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub tables_total: usize,
    /// Set once a table failure must stop the job.
    pub halted: Arc<AtomicBool>,
}

impl WorkerContext {
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Severity of a table-level failure; halts the job when
    /// `continue_on_error` is off.
    fn table_failure_severity(&self) -> Severity {
        if self.continue_on_error {
            Severity::Error
        } else {
            self.halted.store(true, Ordering::SeqCst);
            Severity::Critical
        }
    }
}

/// Process one table end to end. Never fails: problems become
/// [`ProcessingError`]s sent on `events` and a table status.
pub async fn process_table(
    ctx: &WorkerContext,
    job: WorkerJob,
    events: &mpsc::Sender<WorkerEvent>,
) -> WorkerResult {
    let table = job.table;
    if ctx.is_halted() {
        debug!("{}: not processed, job halted", table.original_name);
        return WorkerResult::skipped(&table);
    }

    let started = Instant::now();
    let mut result = if table.is_counter_table {
        process_counter_table(ctx, &table, events).await
    } else {
        process_data_table(ctx, &table, events).await
    };
    result.stats.duration_ms = started.elapsed().as_millis() as u64;

    info!(
        "{}: {:?}, {} rows ({} valid, {} invalid) in {}ms",
        table.original_name,
        result.stats.status,
        result.stats.records_total,
        result.stats.records_valid,
        result.stats.records_invalid,
        result.stats.duration_ms
    );
    result
}

async fn notify(events: &mpsc::Sender<WorkerEvent>, event: WorkerEvent) {
    if events.send(event).await.is_err() {
        debug!("Aggregator closed, worker event dropped");
    }
}

async fn send_error(
    events: &mpsc::Sender<WorkerEvent>,
    stats: &mut TableStats,
    error: ProcessingError,
) {
    if error.invalidates() {
        stats.errors += 1;
    } else {
        stats.warnings += 1;
    }
    notify(events, WorkerEvent::Error(error)).await;
}

/// Report rows the extractor could not parse.
async fn report_skipped(
    result: &mut WorkerResult,
    table: &str,
    skipped: Vec<SkippedRow>,
    events: &mpsc::Sender<WorkerEvent>,
) {
    for row in skipped {
        result.stats.rows_skipped += 1;
        let error = ProcessingError::new(
            ErrorType::Extraction,
            Severity::Warning,
            format!("row skipped: {}", row.message),
        )
        .table(table)
        .record(row.number);
        result.validation.record_errors(table, std::slice::from_ref(&error));
        send_error(events, &mut result.stats, error).await;
    }
}

/// Record sink failures against the table.
async fn report_sink_failures(
    ctx: &WorkerContext,
    result: &mut WorkerResult,
    table: &str,
    failures: Vec<SinkFailure>,
    events: &mpsc::Sender<WorkerEvent>,
) {
    for failure in failures {
        let severity = ctx.table_failure_severity();
        let error = ProcessingError::new(
            ErrorType::Export,
            severity,
            format!("{} export failed: {}", failure.sink, failure.error),
        )
        .table(table);
        result.validation.record_errors(table, std::slice::from_ref(&error));
        send_error(events, &mut result.stats, error).await;
        result.stats.status = if severity == Severity::Critical {
            TableStatus::Failed
        } else {
            TableStatus::Degraded
        };
    }
}

/// Hand the buffered rows to the sinks.
async fn flush(
    ctx: &WorkerContext,
    result: &mut WorkerResult,
    table: &str,
    export: &mut TableExport,
    rows: &mut Vec<Vec<SqlValue>>,
    events: &mpsc::Sender<WorkerEvent>,
) {
    if rows.is_empty() {
        return;
    }
    let t = Instant::now();
    export.write(std::mem::take(rows)).await;
    result.timings.export_ms += t.elapsed().as_millis() as u64;
    let failures = export.take_failures();
    report_sink_failures(ctx, result, table, failures, events).await;
}

async fn process_data_table(
    ctx: &WorkerContext,
    table: &TableInfo,
    events: &mpsc::Sender<WorkerEvent>,
) -> WorkerResult {
    let mut result = WorkerResult::new(TableStats::new(&table.original_name, &table.name));
    result.stats.status = TableStatus::Completed;
    let name = table.original_name.as_str();
    let batch_size = ctx.batch_size.max(1);

    notify(
        events,
        WorkerEvent::Progress(ProgressUpdate::table(
            table,
            JobStatus::Extracting,
            0,
            ctx.tables_total,
        )),
    )
    .await;

    let validator = Validator::new(&ctx.repo, table);
    let transformer = Transformer::new(&ctx.normalizers, table);

    let mut export = if ctx.dry_run || ctx.exports.is_empty() {
        None
    } else {
        let t = Instant::now();
        let mut export = ctx
            .exports
            .begin(
                ExportTable {
                    source_table: table.original_name.clone(),
                    target_table: table.name.clone(),
                    columns: target_columns(table),
                },
                ctx.continue_on_error,
            )
            .await;
        result.timings.export_ms += t.elapsed().as_millis() as u64;
        let failures = export.take_failures();
        report_sink_failures(ctx, &mut result, name, failures, events).await;
        Some(export)
    };
    let mut rows = Vec::new();

    let (mut chunks, reader) = ctx.extractor.stream(table);
    while let Some(chunk) = chunks.recv().await {
        result.timings.extract_ms += chunk.read_time.as_millis() as u64;
        report_skipped(&mut result, name, chunk.skipped, events).await;

        notify(
            events,
            WorkerEvent::Progress(ProgressUpdate::table(
                table,
                JobStatus::Validating,
                result.stats.records_total,
                ctx.tables_total,
            )),
        )
        .await;

        for record in &chunk.records {
            result.stats.records_total += 1;

            let t = Instant::now();
            let check = validator.validate(record);
            result.timings.validate_ms += t.elapsed().as_millis() as u64;

            let t = Instant::now();
            let transformed = transformer.transform(record);
            result.timings.transform_ms += t.elapsed().as_millis() as u64;

            let mut errors = check.errors;
            errors.extend(transformed.errors);
            let valid = !errors.iter().any(ProcessingError::invalidates);
            result.validation.record(name, valid, &errors);

            if valid {
                result.stats.records_valid += 1;
                if export.as_ref().is_some_and(TableExport::is_active) {
                    rows.push(transformed.values);
                }
            } else {
                result.stats.records_invalid += 1;
            }
            for error in errors {
                send_error(events, &mut result.stats, error).await;
            }

            if rows.len() >= batch_size {
                if let Some(export) = export.as_mut() {
                    flush(ctx, &mut result, name, export, &mut rows, events).await;
                }
            }
        }

        let phase = if export.is_some() {
            JobStatus::Exporting
        } else {
            JobStatus::Transforming
        };
        notify(
            events,
            WorkerEvent::Progress(ProgressUpdate::table(
                table,
                phase,
                result.stats.records_total,
                ctx.tables_total,
            )),
        )
        .await;
    }

    let read = match reader.await {
        Ok(read) => read,
        Err(e) => Err(crate::error::MigrateError::extraction(name, e.to_string())),
    };
    if let Err(e) = read {
        warn!("{}: extraction failed: {}", name, e);
        let error = ProcessingError::new(
            ErrorType::Extraction,
            ctx.table_failure_severity(),
            e.to_string(),
        )
        .table(name);
        result.validation.record_errors(name, std::slice::from_ref(&error));
        send_error(events, &mut result.stats, error).await;
        result.stats.status = TableStatus::Failed;
        return result;
    }

    if let Some(mut export) = export {
        flush(ctx, &mut result, name, &mut export, &mut rows, events).await;
        let t = Instant::now();
        let (files, failures) = export.finish().await;
        result.timings.export_ms += t.elapsed().as_millis() as u64;
        result.outputs.extend(files);
        report_sink_failures(ctx, &mut result, name, failures, events).await;
    }
    result
}

async fn process_counter_table(
    ctx: &WorkerContext,
    table: &TableInfo,
    events: &mpsc::Sender<WorkerEvent>,
) -> WorkerResult {
    let mut result = WorkerResult::new(TableStats::new(&table.original_name, ""));
    let name = table.original_name.clone();

    let Some(mapping) = ctx.repo.get_table_mapping(&name).cloned() else {
        result.stats.status = TableStatus::Failed;
        return result;
    };

    let t = Instant::now();
    let extractor = ctx.extractor;
    let owned = table.clone();
    let read = tokio::task::spawn_blocking(move || extractor.read_all(&owned)).await;
    result.timings.extract_ms = t.elapsed().as_millis() as u64;

    let (records, skipped) = match read {
        Ok(Ok(read)) => read,
        Ok(Err(e)) => return failed_counter(ctx, result, &name, e.to_string(), events).await,
        Err(e) => return failed_counter(ctx, result, &name, e.to_string(), events).await,
    };
    let unread = skipped.len();
    report_skipped(&mut result, &name, skipped, events).await;

    let (sequence, max) = counter_sequence(table, &mapping, &records);
    if max.is_none() {
        let error = ProcessingError::new(
            ErrorType::Transformation,
            Severity::Warning,
            format!(
                "no numeric counter value found; {} starts at 1",
                sequence.name
            ),
        )
        .table(&name);
        send_error(events, &mut result.stats, error).await;
    } else if unread > 0 {
        let error = ProcessingError::new(
            ErrorType::Transformation,
            Severity::Warning,
            format!(
                "{} counter rows unreadable; {} may start below the legacy maximum",
                unread, sequence.name
            ),
        )
        .table(&name);
        send_error(events, &mut result.stats, error).await;
    }
    info!(
        "{}: counter table seeds sequence {} at {}",
        name, sequence.name, sequence.start
    );

    result.stats.status = TableStatus::Sequence;
    result.stats.records_total = records.len() as u64;
    result.sequence = Some(sequence);
    result
}

async fn failed_counter(
    ctx: &WorkerContext,
    mut result: WorkerResult,
    table: &str,
    message: String,
    events: &mpsc::Sender<WorkerEvent>,
) -> WorkerResult {
    let error = ProcessingError::new(ErrorType::Extraction, ctx.table_failure_severity(), message)
        .table(table);
    result.validation.record_errors(table, std::slice::from_ref(&error));
    send_error(events, &mut result.stats, error).await;
    result.stats.status = TableStatus::Failed;
    result
}
