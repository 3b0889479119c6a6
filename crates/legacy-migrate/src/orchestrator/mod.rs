//! Conversion orchestrator - main workflow coordinator.
//!
//! A run analyzes the source export, then dispatches its tables level by
//! level onto a pool of worker tasks. Workers never touch the job; they
//! report through [`WorkerEvent`]s to a single [`Aggregator`] task which owns
//! the [`ConversionJob`] until the run completes.

mod aggregator;
mod worker;

pub use aggregator::Aggregator;
pub use worker::{ProgressUpdate, WorkerEvent, WorkerJob, WorkerResult};

use crate::config::{Config, MappingRepository};
use crate::error::{MigrateError, Result};
use crate::export::ExportSet;
use crate::extract::Extractor;
use crate::job::{
    CompletedJob, ConversionJob, ErrorType, JobStatus, PerformanceStats, ProcessingError,
    TableStats, TableStatus,
};
use crate::normalize::NormalizerSet;
use crate::rules::Severity;
use crate::schema::{ProcessingPlan, SchemaAnalyzer};
use crate::target::{TargetRegistry, TargetStore};
use crate::transform::SequenceDeclaration;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use worker::WorkerContext;

/// Capacity of the worker → aggregator event channel.
const EVENT_BUFFER: usize = 1024;

/// Runs conversion jobs for one configuration.
pub struct Orchestrator {
    repo: Arc<MappingRepository>,
    normalizers: Arc<NormalizerSet>,
    registry: Arc<TargetRegistry>,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
}

impl Orchestrator {
    /// Create a new orchestrator. Fails if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let normalizers = NormalizerSet::new(&config.normalization)?;
        Ok(Self {
            repo: Arc::new(MappingRepository::new(config)?),
            normalizers: Arc::new(normalizers),
            registry: Arc::new(TargetRegistry::new()),
            progress: None,
        })
    }

    /// Share a process-wide target registry instead of a private one.
    pub fn with_registry(mut self, registry: Arc<TargetRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Stream progress updates to `progress`. Updates are dropped when the
    /// receiver falls behind.
    pub fn with_progress(mut self, progress: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &Config {
        self.repo.config()
    }

    pub fn repository(&self) -> &MappingRepository {
        &self.repo
    }

    /// Discover the tables of a source export and plan their processing.
    pub async fn analyze(&self, source: &Path) -> Result<ProcessingPlan> {
        let repo = self.repo.clone();
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || SchemaAnalyzer::new(&repo).analyze(&source))
            .await
            .map_err(|e| MigrateError::SchemaDiscovery(format!("analysis task failed: {}", e)))?
    }

    /// Run a full conversion of the export in `source`.
    ///
    /// Problems found while processing are recorded on the returned job;
    /// only an internal task failure surfaces as `Err`.
    pub async fn run(&self, source: &Path) -> Result<CompletedJob> {
        let started = Instant::now();
        let config = self.repo.config();
        let job = ConversionJob::new(source, &config.company, config.hash());
        let job_id = job.id.clone();
        info!(
            "Starting job {} for company '{}' from {}",
            job_id,
            config.company,
            source.display()
        );

        let (events, inbound) = mpsc::channel(EVENT_BUFFER);
        let aggregator = Aggregator::new(job, self.progress.clone()).spawn(inbound);

        let mut run = JobRun {
            events,
            analyze_ms: 0,
            workers: config.processing_options.get_workers(),
        };
        self.drive(source, &mut run).await?;

        let JobRun {
            events,
            analyze_ms,
            workers,
        } = run;
        drop(events);
        self.finish(aggregator, started, analyze_ms, workers).await
    }

    /// Close every target connection this orchestrator opened.
    pub async fn close(&self) {
        self.registry.close_all().await;
    }

    async fn drive(&self, source: &Path, run: &mut JobRun) -> Result<()> {
        let config = self.repo.config();
        let options = &config.processing_options;

        info!("Phase 1: Analyzing source export");
        run.send(WorkerEvent::Progress(ProgressUpdate::phase(JobStatus::Analyzing, 0)))
            .await;
        let analyze_started = Instant::now();
        let plan = match self.analyze(source).await {
            Ok(plan) => plan,
            Err(e) => {
                error!("Analysis failed: {}", e);
                run.critical(e.to_string()).await;
                return Ok(());
            }
        };
        run.analyze_ms = analyze_started.elapsed().as_millis() as u64;
        info!(
            "Found {} tables ({} rows) in {} levels",
            plan.tables.len(),
            plan.total_records(),
            plan.levels.len()
        );
        for name in &plan.cyclic {
            run.send(WorkerEvent::Error(
                ProcessingError::new(
                    ErrorType::Validation,
                    Severity::Warning,
                    "table is part of a reference cycle; processed in the last level",
                )
                .table(name),
            ))
            .await;
        }

        self.check_structure(&plan, run).await;

        let target = if config.output.direct && !options.dry_run {
            match self.connect_target().await {
                Ok(target) => Some(target),
                Err(e) => {
                    error!("Target store unavailable: {}", e);
                    run.critical(format!("target store unavailable: {}", e)).await;
                    return Ok(());
                }
            }
        } else {
            None
        };

        let exports = ExportSet::from_config(config, target);
        if options.dry_run {
            info!("Dry run: export phase will be skipped");
        } else {
            info!("Exporting via: {}", exports.names().join(", "));
        }

        let ctx = Arc::new(WorkerContext {
            repo: self.repo.clone(),
            normalizers: self.normalizers.clone(),
            exports,
            extractor: Extractor::new(options.batch_size),
            batch_size: options.batch_size,
            dry_run: options.dry_run,
            continue_on_error: options.continue_on_error,
            tables_total: plan.tables.len(),
            halted: Arc::new(AtomicBool::new(false)),
        });

        info!("Phase 2: Processing tables with {} workers", run.workers);
        run.send(WorkerEvent::Progress(ProgressUpdate::phase(
            JobStatus::Extracting,
            plan.tables.len(),
        )))
        .await;

        let mut sequences = Vec::new();
        for (level, names) in plan.levels.iter().enumerate() {
            let mut jobs = Vec::new();
            for table in names.iter().filter_map(|n| plan.table(n)) {
                if ctx.is_halted() || table.is_empty() {
                    if table.is_empty() {
                        debug!("{}: no data rows, skipped", table.original_name);
                    }
                    run.send(WorkerEvent::Finished(Box::new(WorkerResult::skipped(table))))
                        .await;
                } else {
                    jobs.push(WorkerJob {
                        table: table.clone(),
                    });
                }
            }
            if jobs.is_empty() {
                continue;
            }
            debug!("Level {}: dispatching {} tables", level, jobs.len());
            sequences.extend(dispatch_level(&ctx, jobs, run.workers, &run.events).await?);
        }

        if !sequences.is_empty() && !ctx.dry_run && !ctx.is_halted() {
            self.export_sequences(&ctx, &sequences, run).await;
        }
        Ok(())
    }

    /// Record unreadable and missing tables.
    async fn check_structure(&self, plan: &ProcessingPlan, run: &JobRun) {
        for (name, reason) in &plan.unreadable {
            let severity = if self.config().processing_options.continue_on_error {
                Severity::Error
            } else {
                Severity::Critical
            };
            run.send(WorkerEvent::Error(
                ProcessingError::new(ErrorType::Extraction, severity, reason.clone()).table(name),
            ))
            .await;
            let mut stats = TableStats::new(name, self.repo.target_table_name(name));
            stats.status = TableStatus::Failed;
            stats.errors = 1;
            run.send(WorkerEvent::Finished(Box::new(WorkerResult::new(stats))))
                .await;
        }

        for required in self.repo.required_tables() {
            let found = plan.table(required).is_some()
                || plan
                    .unreadable
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case(required));
            if !found {
                warn!("Required table {} not found in source", required);
                run.send(WorkerEvent::Error(
                    ProcessingError::new(
                        ErrorType::Validation,
                        Severity::Error,
                        "required table not found in source export",
                    )
                    .table(required.as_str()),
                ))
                .await;
            }
        }
    }

    async fn connect_target(&self) -> Result<Arc<dyn TargetStore>> {
        let config = self.repo.config();
        let database = self.repo.get_target_database_name(&config.company);
        info!("Connecting to target database {}", database);
        let target: Arc<dyn TargetStore> = self
            .registry
            .get_or_connect(&config.database_config, &database)
            .await?;
        Ok(target)
    }

    async fn export_sequences(
        &self,
        ctx: &WorkerContext,
        sequences: &[SequenceDeclaration],
        run: &JobRun,
    ) {
        run.send(WorkerEvent::Progress(ProgressUpdate::phase(
            JobStatus::Exporting,
            ctx.tables_total,
        )))
        .await;
        for sink in ctx.exports.export_sequences(sequences, ctx.continue_on_error).await {
            match sink.result {
                Ok(outcome) => run.send(WorkerEvent::Outputs(outcome.files)).await,
                Err(e) => {
                    warn!("{} sequence export failed: {}", sink.sink, e);
                    let severity = if ctx.continue_on_error {
                        Severity::Error
                    } else {
                        Severity::Critical
                    };
                    run.send(WorkerEvent::Error(ProcessingError::new(
                        ErrorType::Export,
                        severity,
                        format!("{} sequence export failed: {}", sink.sink, e),
                    )))
                    .await;
                }
            }
        }
    }

    async fn finish(
        &self,
        aggregator: JoinHandle<(ConversionJob, PerformanceStats)>,
        started: Instant,
        analyze_ms: u64,
        workers: usize,
    ) -> Result<CompletedJob> {
        let (mut job, mut performance) = aggregator
            .await
            .map_err(|e| MigrateError::Critical(format!("aggregator task failed: {}", e)))?;

        performance.analyze_ms = analyze_ms;
        performance.total_ms = started.elapsed().as_millis() as u64;
        performance.workers = workers;
        performance.records_per_second = if performance.total_ms > 0 {
            job.records_total as f64 * 1000.0 / performance.total_ms as f64
        } else {
            0.0
        };
        job.set_performance(performance);

        let job = job.complete();
        info!(
            "Job {} {}: {} records ({} valid, {} invalid), {} errors in {:.1}s",
            job.id,
            job.status,
            job.records_total,
            job.records_valid,
            job.records_invalid,
            job.errors.len(),
            job.duration_seconds()
        );
        Ok(job)
    }
}

/// Per-run state held by the orchestrator task.
struct JobRun {
    events: mpsc::Sender<WorkerEvent>,
    analyze_ms: u64,
    workers: usize,
}

impl JobRun {
    async fn send(&self, event: WorkerEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Aggregator closed, event dropped");
        }
    }

    async fn critical(&self, description: String) {
        self.send(WorkerEvent::Error(ProcessingError::critical(description)))
            .await;
    }
}

/// Run one dependency level to completion on a bounded work queue.
///
/// Returns the sequences produced by counter tables in this level.
async fn dispatch_level(
    ctx: &Arc<WorkerContext>,
    jobs: Vec<WorkerJob>,
    workers: usize,
    events: &mpsc::Sender<WorkerEvent>,
) -> Result<Vec<SequenceDeclaration>> {
    let workers = workers.clamp(1, jobs.len().max(1));
    let (queue, inbox) = async_channel::bounded::<WorkerJob>(workers * 2);

    let handles: Vec<JoinHandle<Vec<SequenceDeclaration>>> = (0..workers)
        .map(|worker_id| {
            let inbox = inbox.clone();
            let ctx = ctx.clone();
            let events = events.clone();
            tokio::spawn(async move {
                let mut sequences = Vec::new();
                while let Ok(job) = inbox.recv().await {
                    debug!("Worker {} picked {}", worker_id, job.table.original_name);
                    let result = worker::process_table(&ctx, job, &events).await;
                    if let Some(sequence) = &result.sequence {
                        sequences.push(sequence.clone());
                    }
                    if events
                        .send(WorkerEvent::Finished(Box::new(result)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                sequences
            })
        })
        .collect();
    drop(inbox);

    for job in jobs {
        if queue.send(job).await.is_err() {
            break;
        }
    }
    queue.close();

    let mut sequences = Vec::new();
    for joined in futures::future::join_all(handles).await {
        let produced =
            joined.map_err(|e| MigrateError::Critical(format!("worker task failed: {}", e)))?;
        sequences.extend(produced);
    }
    Ok(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::OutputKind;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn config(output: &Path) -> Config {
        let mut config = Config::builtin();
        config.company = "acme".to_string();
        config.output.directory = output.to_path_buf();
        config.processing_options.workers = Some(2);
        config
    }

    #[tokio::test]
    async fn test_missing_required_value_invalidates_record() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write(
            source.path(),
            "tblCustomer.csv",
            "CustomerName,Quantity\nAcme Pipe,5\n,7\nBaker Supply,9\n",
        );

        let orchestrator = Orchestrator::new(config(output.path())).unwrap();
        let job = orchestrator.run(source.path()).await.unwrap();

        assert_eq!(job.records_total, 3);
        assert_eq!(job.records_valid, 2);
        assert_eq!(job.records_invalid, 1);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].severity, Severity::Error);
        assert_eq!(job.errors[0].record, Some(2));
        assert_eq!(job.status, JobStatus::CompletedWithWarnings);

        let csv = fs::read_to_string(output.path().join("customers.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write(
            source.path(),
            "tblCustomer.csv",
            "CustomerName,Quantity\nAcme Pipe,5\n",
        );

        let mut config = config(&output.path().join("out"));
        config.processing_options.dry_run = true;
        let job = Orchestrator::new(config).unwrap().run(source.path()).await.unwrap();

        assert!(job.output_files.is_empty());
        assert!(!output.path().join("out").exists());
        assert_eq!(job.validation_stats.total_validations, 1);
        assert_eq!(job.table_stats["tblCustomer"].records_valid, 1);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_empty_table_skipped_without_error() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write(source.path(), "tblInventory.csv", "Grade,Size\n");
        write(source.path(), "tblCustomer.csv", "CustomerName\nAcme Pipe\n");

        let job = Orchestrator::new(config(output.path()))
            .unwrap()
            .run(source.path())
            .await
            .unwrap();

        assert!(job.errors.is_empty());
        assert_eq!(job.table_stats["tblInventory"].status, TableStatus::Skipped);
        assert!(!output.path().join("inventory.csv").exists());
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_counter_table_becomes_sequence() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write(source.path(), "tblCounter.csv", "NextID\n500\n");
        write(source.path(), "tblCustomer.csv", "CustomerName\nAcme Pipe\n");

        let job = Orchestrator::new(config(output.path()))
            .unwrap()
            .run(source.path())
            .await
            .unwrap();

        assert_eq!(job.sequences.len(), 1);
        assert_eq!(job.sequences[0].name, "counter_seq");
        assert_eq!(job.sequences[0].start, 501);
        assert_eq!(job.table_stats["tblCounter"].status, TableStatus::Sequence);
        assert_eq!(job.records_total, 1);
        assert!(!output.path().join("tblcounter.csv").exists());
        assert!(output.path().join("sequences.sql").exists());
        assert_eq!(
            job.output_files
                .iter()
                .filter(|f| f.kind == OutputKind::Csv)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_unreadable_counter_row_is_reported() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(source.path().join("tblCounter.csv"), b"NextID\n500\n\xff\xfe9000\n").unwrap();

        let job = Orchestrator::new(config(output.path()))
            .unwrap()
            .run(source.path())
            .await
            .unwrap();

        let stats = &job.table_stats["tblCounter"];
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.records_total, 1);
        assert_eq!(job.sequences[0].start, 501);
        assert!(job
            .errors
            .iter()
            .any(|e| e.error_type == ErrorType::Extraction && e.severity == Severity::Warning));
        assert!(job
            .errors
            .iter()
            .any(|e| e.description.contains("may start below the legacy maximum")));
        assert_eq!(job.status, JobStatus::CompletedWithWarnings);
    }

    #[tokio::test]
    async fn test_table_larger_than_batch_size_streams_to_sinks() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write(
            source.path(),
            "tblCustomer.csv",
            "CustomerName,Quantity\nA1,1\nA2,2\nA3,3\nA4,4\nA5,5\n",
        );

        let mut config = config(output.path());
        config.processing_options.batch_size = 2;
        let job = Orchestrator::new(config).unwrap().run(source.path()).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        let csv = fs::read_to_string(output.path().join("customers.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("customer_name"));
        assert!(lines[5].starts_with("A5"));
        let sql = fs::read_to_string(output.path().join("customers.sql")).unwrap();
        assert!(sql.ends_with("-- 5 rows\nCOMMIT;\n"));
    }

    #[tokio::test]
    async fn test_sink_failure_stops_later_sinks_without_continue_on_error() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write(source.path(), "tblCustomer.csv", "CustomerName\nAcme Pipe\n");
        fs::create_dir(output.path().join("customers.csv")).unwrap();

        let mut config = config(output.path());
        config.processing_options.continue_on_error = false;
        let job = Orchestrator::new(config).unwrap().run(source.path()).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.table_stats["tblCustomer"].status, TableStatus::Failed);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].error_type, ErrorType::Export);
        assert!(!output.path().join("customers.sql").exists());
    }

    #[tokio::test]
    async fn test_sink_failure_leaves_other_sinks_with_continue_on_error() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write(source.path(), "tblCustomer.csv", "CustomerName\nAcme Pipe\n");
        fs::create_dir(output.path().join("customers.csv")).unwrap();

        let mut config = config(output.path());
        config.processing_options.continue_on_error = true;
        let job = Orchestrator::new(config).unwrap().run(source.path()).await.unwrap();

        assert_eq!(job.status, JobStatus::CompletedWithWarnings);
        assert_eq!(job.table_stats["tblCustomer"].status, TableStatus::Degraded);
        assert!(output.path().join("customers.sql").exists());
    }

    #[tokio::test]
    async fn test_missing_source_fails_job() {
        let output = tempfile::tempdir().unwrap();
        let job = Orchestrator::new(config(output.path()))
            .unwrap()
            .run(&output.path().join("does-not-exist"))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.has_critical());
    }

    #[tokio::test]
    async fn test_missing_required_table_reported() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write(source.path(), "tblCustomer.csv", "CustomerName\nAcme Pipe\n");

        let mut config = config(output.path());
        config.validation_rules.required_tables = vec!["tblWorkOrder".to_string()];
        let job = Orchestrator::new(config).unwrap().run(source.path()).await.unwrap();

        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].error_type, ErrorType::Validation);
        assert_eq!(job.errors[0].table.as_deref(), Some("tblWorkOrder"));
    }

    #[tokio::test]
    async fn test_progress_updates_streamed() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write(source.path(), "tblCustomer.csv", "CustomerName\nAcme Pipe\n");

        let (tx, mut rx) = mpsc::channel(256);
        let orchestrator = Orchestrator::new(config(output.path()))
            .unwrap()
            .with_progress(tx);
        let job = orchestrator.run(source.path()).await.unwrap();
        drop(orchestrator);

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        assert!(!updates.is_empty());
        assert!(updates.iter().all(|u| u.job_id == job.id));
        assert!(updates.iter().any(|u| u.tables_completed == 1));
    }
}
