//! Output sinks for normalized records.
//!
//! Every sink consumes the same stream of [`ExportBatch`]es for a table:
//! `begin` once, `write` per batch of at most `batch_size` rows, `finish`
//! once. A [`TableExport`] drives the configured sinks for one table in a
//! fixed order (delimited text first, so a bulk-load script can reference
//! it) and collects each sink's failures.

mod csv;
mod postgres;
mod sql;

pub use self::csv::CsvExporter;
pub use self::postgres::PostgresExporter;
pub use self::sql::SqlScriptExporter;

use crate::config::{Config, SqlMode};
use crate::error::{MigrateError, Result};
use crate::job::OutputFile;
use crate::target::{SqlValue, TargetColumn, TargetStore};
use crate::transform::SequenceDeclaration;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// The target shape of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub source_table: String,
    pub target_table: String,
    pub columns: Vec<TargetColumn>,
}

/// A run of consecutive valid rows of one table, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportBatch {
    pub table: Arc<ExportTable>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// What a sink produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportOutcome {
    pub files: Vec<OutputFile>,
    pub rows_written: u64,
}

/// A destination for normalized records.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Short sink name used in logs and error descriptions.
    fn name(&self) -> &'static str;

    /// Prepare the destination of one table (file header, target DDL).
    async fn begin(&self, table: &ExportTable) -> Result<()>;

    /// Write one batch; returns the rows written.
    async fn write(&self, batch: Arc<ExportBatch>) -> Result<u64>;

    /// Close the table's destination.
    async fn finish(&self, table: &ExportTable, rows_written: u64) -> Result<ExportOutcome>;

    /// Write the sequence declarations derived from counter tables.
    async fn export_sequences(&self, sequences: &[SequenceDeclaration]) -> Result<ExportOutcome>;
}

/// A sink that failed.
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: &'static str,
    pub error: MigrateError,
}

/// Outcome of one sink for the sequence declarations.
pub struct SinkResult {
    pub sink: &'static str,
    pub result: Result<ExportOutcome>,
}

/// The sinks enabled for a job.
#[derive(Clone, Default)]
pub struct ExportSet {
    exporters: Vec<Arc<dyn Exporter>>,
}

impl ExportSet {
    pub fn new(exporters: Vec<Arc<dyn Exporter>>) -> Self {
        Self { exporters }
    }

    /// Build the sinks selected in `config.output`.
    ///
    /// The direct sink is added only when a target store is supplied.
    pub fn from_config(config: &Config, target: Option<Arc<dyn TargetStore>>) -> Self {
        let output = &config.output;
        let mut exporters: Vec<Arc<dyn Exporter>> = Vec::new();
        if output.csv {
            exporters.push(Arc::new(CsvExporter::new(&output.directory)));
        }
        if output.sql {
            // A bulk-load script needs the delimited file next to it.
            let mode = if output.csv {
                output.sql_mode
            } else {
                SqlMode::Insert
            };
            exporters.push(Arc::new(SqlScriptExporter::new(
                &output.directory,
                &output.schema,
                mode,
                config.processing_options.batch_size,
            )));
        }
        if let Some(target) = target {
            exporters.push(Arc::new(PostgresExporter::new(
                target,
                &output.schema,
                config.processing_options.batch_size,
            )));
        }
        Self { exporters }
    }

    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.exporters.iter().map(|e| e.name()).collect()
    }

    /// Start exporting one table through every sink.
    ///
    /// With `continue_on_error` a failing sink is dropped and the others
    /// carry on; without it the first failure stops every sink of the table.
    pub async fn begin(&self, table: ExportTable, continue_on_error: bool) -> TableExport {
        let mut export = TableExport {
            table: Arc::new(table),
            sinks: Vec::with_capacity(self.exporters.len()),
            failures: Vec::new(),
            continue_on_error,
            stopped: false,
        };
        for exporter in &self.exporters {
            if export.stopped {
                break;
            }
            match exporter.begin(&export.table).await {
                Ok(()) => export.sinks.push((exporter.clone(), 0)),
                Err(e) => export.fail(exporter.name(), e),
            }
        }
        export
    }

    /// Run the sinks for the job's sequence declarations, stopping at the
    /// first failure unless `continue_on_error` is set.
    pub async fn export_sequences(
        &self,
        sequences: &[SequenceDeclaration],
        continue_on_error: bool,
    ) -> Vec<SinkResult> {
        let mut results = Vec::with_capacity(self.exporters.len());
        for exporter in &self.exporters {
            let result = exporter.export_sequences(sequences).await;
            let failed = result.is_err();
            results.push(SinkResult {
                sink: exporter.name(),
                result,
            });
            if failed && !continue_on_error {
                break;
            }
        }
        results
    }
}

/// The sinks still writing one table.
pub struct TableExport {
    table: Arc<ExportTable>,
    sinks: Vec<(Arc<dyn Exporter>, u64)>,
    failures: Vec<SinkFailure>,
    continue_on_error: bool,
    stopped: bool,
}

impl TableExport {
    /// Whether any sink is still writing.
    pub fn is_active(&self) -> bool {
        !self.stopped && !self.sinks.is_empty()
    }

    /// Send one batch of rows to every remaining sink.
    pub async fn write(&mut self, rows: Vec<Vec<SqlValue>>) {
        if !self.is_active() || rows.is_empty() {
            return;
        }
        let batch = Arc::new(ExportBatch {
            table: self.table.clone(),
            rows,
        });
        let mut i = 0;
        while i < self.sinks.len() && !self.stopped {
            let exporter = self.sinks[i].0.clone();
            debug!(
                "{}: exporting {} rows via {}",
                self.table.source_table,
                batch.rows.len(),
                exporter.name()
            );
            match exporter.write(batch.clone()).await {
                Ok(n) => {
                    self.sinks[i].1 += n;
                    i += 1;
                }
                Err(e) => {
                    self.sinks.remove(i);
                    self.fail(exporter.name(), e);
                }
            }
        }
    }

    /// Failures recorded since the last call.
    pub fn take_failures(&mut self) -> Vec<SinkFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Close every remaining sink. A stopped export closes nothing.
    pub async fn finish(mut self) -> (Vec<OutputFile>, Vec<SinkFailure>) {
        let mut files = Vec::new();
        if self.stopped {
            return (files, self.failures);
        }
        for (exporter, written) in std::mem::take(&mut self.sinks) {
            if self.stopped {
                break;
            }
            match exporter.finish(&self.table, written).await {
                Ok(outcome) => {
                    debug!(
                        "{}: {} wrote {} rows",
                        self.table.source_table,
                        exporter.name(),
                        outcome.rows_written
                    );
                    files.extend(outcome.files);
                }
                Err(e) => self.fail(exporter.name(), e),
            }
        }
        (files, self.failures)
    }

    fn fail(&mut self, sink: &'static str, error: MigrateError) {
        warn!("{}: {} export failed: {}", self.table.source_table, sink, error);
        self.failures.push(SinkFailure { sink, error });
        if !self.continue_on_error {
            self.stopped = true;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::typemap::ColumnType;

    pub(crate) fn table() -> ExportTable {
        ExportTable {
            source_table: "tblCustomer".to_string(),
            target_table: "customers".to_string(),
            columns: vec![
                TargetColumn::new("customer_name", ColumnType::Text),
                TargetColumn::new("quantity", ColumnType::Integer),
            ],
        }
    }

    pub(crate) fn rows() -> Vec<Vec<SqlValue>> {
        vec![
            vec![SqlValue::Text("O'Brien, Supply".into()), SqlValue::I64(3)],
            vec![SqlValue::Text("Acme".into()), SqlValue::Null],
        ]
    }

    pub(crate) fn batch() -> Arc<ExportBatch> {
        Arc::new(ExportBatch {
            table: Arc::new(table()),
            rows: rows(),
        })
    }

    #[derive(Clone, Copy)]
    enum FailAt {
        Begin,
        Write,
    }

    struct FailingSink(FailAt);

    #[async_trait]
    impl Exporter for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn begin(&self, table: &ExportTable) -> Result<()> {
            match self.0 {
                FailAt::Begin => Err(MigrateError::export(&table.source_table, "disk full")),
                FailAt::Write => Ok(()),
            }
        }

        async fn write(&self, batch: Arc<ExportBatch>) -> Result<u64> {
            Err(MigrateError::export(&batch.table.source_table, "disk full"))
        }

        async fn finish(&self, _: &ExportTable, rows_written: u64) -> Result<ExportOutcome> {
            Ok(ExportOutcome {
                files: Vec::new(),
                rows_written,
            })
        }

        async fn export_sequences(&self, _: &[SequenceDeclaration]) -> Result<ExportOutcome> {
            Err(MigrateError::export("sequences", "disk full"))
        }
    }

    fn failing_then_csv(fail: FailAt, dir: &std::path::Path) -> ExportSet {
        ExportSet::new(vec![
            Arc::new(FailingSink(fail)),
            Arc::new(CsvExporter::new(dir)),
        ])
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let set = failing_then_csv(FailAt::Write, dir.path());
        let mut export = set.begin(table(), true).await;
        export.write(rows()).await;
        assert_eq!(export.take_failures().len(), 1);
        assert!(export.is_active());

        let (files, failures) = export.finish().await;
        assert!(failures.is_empty());
        assert_eq!(files.len(), 1);
        let content = std::fs::read_to_string(dir.path().join("customers.csv")).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_failure_stops_later_sinks_without_continue_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let set = failing_then_csv(FailAt::Begin, dir.path());
        let mut export = set.begin(table(), false).await;
        assert!(!export.is_active());
        export.write(rows()).await;

        let (files, failures) = export.finish().await;
        assert!(files.is_empty());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].sink, "failing");
        assert!(!dir.path().join("customers.csv").exists());
    }

    #[tokio::test]
    async fn test_write_failure_stops_remaining_batches() {
        let dir = tempfile::tempdir().unwrap();
        let set = failing_then_csv(FailAt::Write, dir.path());
        let mut export = set.begin(table(), false).await;
        export.write(rows()).await;
        export.write(rows()).await;

        let (files, failures) = export.finish().await;
        assert!(files.is_empty());
        assert_eq!(failures.len(), 1);
        // The csv sink began but never received a batch.
        let content = std::fs::read_to_string(dir.path().join("customers.csv")).unwrap();
        assert_eq!(content, "customer_name,quantity\n");
    }

    #[tokio::test]
    async fn test_batches_append_to_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let set = ExportSet::new(vec![Arc::new(CsvExporter::new(dir.path()))]);
        let mut export = set.begin(table(), false).await;
        export.write(rows()).await;
        export.write(rows()).await;
        export.write(Vec::new()).await;

        let (files, failures) = export.finish().await;
        assert!(failures.is_empty());
        let content = std::fs::read_to_string(dir.path().join("customers.csv")).unwrap();
        assert_eq!(content.matches("customer_name,quantity").count(), 1);
        assert_eq!(content.lines().count(), 5);
        assert_eq!(files[0].bytes, content.len() as u64);
    }

    #[tokio::test]
    async fn test_sequence_export_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let set = ExportSet::new(vec![
            Arc::new(FailingSink(FailAt::Write)),
            Arc::new(SqlScriptExporter::new(dir.path(), "public", SqlMode::Copy, 10)),
        ]);
        let sequences = [SequenceDeclaration {
            name: "counter_seq".to_string(),
            source_table: "tblCounter".to_string(),
            start: 1,
        }];
        assert_eq!(set.export_sequences(&sequences, false).await.len(), 1);
        let results = set.export_sequences(&sequences, true).await;
        assert_eq!(results.len(), 2);
        assert!(results[1].result.is_ok());
    }

    #[test]
    fn test_from_config_selects_sinks() {
        let mut config = Config::builtin();
        assert_eq!(ExportSet::from_config(&config, None).names(), vec!["csv", "sql"]);
        config.output.csv = false;
        config.output.sql = false;
        assert!(ExportSet::from_config(&config, None).is_empty());
    }
}
