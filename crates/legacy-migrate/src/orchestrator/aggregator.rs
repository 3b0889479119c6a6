//! The single owner of a job's mutable state while it runs.

use super::worker::{ProgressUpdate, WorkerEvent};
use crate::job::{ConversionJob, PerformanceStats};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Folds worker events into the [`ConversionJob`].
///
/// Runs until every sender of its channel is dropped, then hands back the
/// job and the summed phase timings.
pub struct Aggregator {
    job: ConversionJob,
    performance: PerformanceStats,
    tables_completed: usize,
    tables_total: usize,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
}

impl Aggregator {
    pub fn new(job: ConversionJob, progress: Option<mpsc::Sender<ProgressUpdate>>) -> Self {
        Self {
            job,
            performance: PerformanceStats::default(),
            tables_completed: 0,
            tables_total: 0,
            progress,
        }
    }

    pub fn spawn(
        mut self,
        mut events: mpsc::Receiver<WorkerEvent>,
    ) -> JoinHandle<(ConversionJob, PerformanceStats)> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event);
            }
            debug!(
                "Job {}: aggregated {} tables, {} errors",
                self.job.id,
                self.tables_completed,
                self.job.errors.len()
            );
            (self.job, self.performance)
        })
    }

    fn handle(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress(update) => {
                self.tables_total = self.tables_total.max(update.tables_total);
                self.job.advance(update.phase);
                self.forward(update);
            }
            WorkerEvent::Error(error) => self.job.add_error(error),
            WorkerEvent::Outputs(files) => self.job.add_outputs(files),
            WorkerEvent::Finished(result) => {
                let result = *result;
                self.tables_completed += 1;
                self.performance.absorb(&result.timings);
                self.job.merge_validation(&result.validation);
                self.job.add_outputs(result.outputs);
                if let Some(sequence) = result.sequence {
                    self.job.add_sequence(sequence);
                }
                let update = ProgressUpdate {
                    table: Some(result.stats.table.clone()),
                    records_processed: result.stats.records_total,
                    records_total: result.stats.records_total,
                    ..ProgressUpdate::phase(self.job.status, 0)
                };
                self.job.record_table(result.stats);
                self.forward(update);
            }
        }
    }

    /// Stamp job-level counters and pass the update on. A slow or closed
    /// consumer never blocks the job.
    fn forward(&self, mut update: ProgressUpdate) {
        let Some(progress) = &self.progress else {
            return;
        };
        update.job_id = self.job.id.clone();
        update.tables_completed = self.tables_completed;
        update.tables_total = self.tables_total.max(self.tables_completed);
        let _ = progress.try_send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{
        ErrorType, JobStatus, PhaseTimings, ProcessingError, TableStats, TableStatus,
    };
    use crate::orchestrator::worker::WorkerResult;
    use crate::rules::Severity;
    use std::path::Path;

    fn job() -> ConversionJob {
        ConversionJob::new(Path::new("/data"), "acme", "hash".to_string())
    }

    fn finished(table: &str, total: u64, valid: u64) -> WorkerEvent {
        let mut stats = TableStats::new(table, table.to_lowercase());
        stats.status = TableStatus::Completed;
        stats.records_total = total;
        stats.records_valid = valid;
        stats.records_invalid = total - valid;
        let mut result = WorkerResult::new(stats);
        result.timings = PhaseTimings {
            extract_ms: 5,
            validate_ms: 1,
            transform_ms: 2,
            export_ms: 3,
        };
        WorkerEvent::Finished(Box::new(result))
    }

    #[tokio::test]
    async fn test_folds_events_into_job() {
        let (tx, rx) = mpsc::channel(16);
        let handle = Aggregator::new(job(), None).spawn(rx);

        tx.send(WorkerEvent::Progress(ProgressUpdate::phase(JobStatus::Extracting, 2)))
            .await
            .unwrap();
        tx.send(finished("tblCustomer", 10, 9)).await.unwrap();
        tx.send(finished("tblWorkOrder", 5, 5)).await.unwrap();
        tx.send(WorkerEvent::Error(
            ProcessingError::new(ErrorType::Validation, Severity::Error, "missing").table("tblCustomer"),
        ))
        .await
        .unwrap();
        drop(tx);

        let (job, performance) = handle.await.unwrap();
        assert_eq!(job.status, JobStatus::Extracting);
        assert_eq!(job.records_total, 15);
        assert_eq!(job.records_valid, 14);
        assert_eq!(job.table_stats.len(), 2);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].job_id, job.id);
        assert_eq!(performance.extract_ms, 10);
        assert_eq!(performance.export_ms, 6);
    }

    #[tokio::test]
    async fn test_forwards_progress_with_job_counters() {
        let (progress_tx, mut progress_rx) = mpsc::channel(16);
        let (tx, rx) = mpsc::channel(16);
        let job = job();
        let id = job.id.clone();
        let handle = Aggregator::new(job, Some(progress_tx)).spawn(rx);

        tx.send(finished("tblCustomer", 3, 3)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let update = progress_rx.recv().await.unwrap();
        assert_eq!(update.job_id, id);
        assert_eq!(update.table.as_deref(), Some("tblCustomer"));
        assert_eq!(update.tables_completed, 1);
        assert_eq!(update.records_processed, 3);
    }

    #[tokio::test]
    async fn test_closed_progress_consumer_is_ignored() {
        let (progress_tx, progress_rx) = mpsc::channel(1);
        drop(progress_rx);
        let (tx, rx) = mpsc::channel(16);
        let handle = Aggregator::new(job(), Some(progress_tx)).spawn(rx);
        tx.send(finished("tblCustomer", 1, 1)).await.unwrap();
        drop(tx);
        let (job, _) = handle.await.unwrap();
        assert_eq!(job.records_total, 1);
    }
}
