//! Direct batched insertion into the target store.

use super::{ExportBatch, ExportOutcome, ExportTable, Exporter};
use crate::error::Result;
use crate::target::TargetStore;
use crate::transform::SequenceDeclaration;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// PostgreSQL allows at most this many bind parameters per statement.
const MAX_PARAMS: usize = 65_535;

/// Inserts rows through a [`TargetStore`], one batch per pooled connection.
pub struct PostgresExporter {
    target: Arc<dyn TargetStore>,
    schema: String,
    batch_size: usize,
}

impl PostgresExporter {
    pub fn new(target: Arc<dyn TargetStore>, schema: &str, batch_size: usize) -> Self {
        Self {
            target,
            schema: schema.to_string(),
            batch_size: batch_size.max(1),
        }
    }

    fn rows_per_statement(&self, columns: usize) -> usize {
        self.batch_size.min(MAX_PARAMS / columns.max(1)).max(1)
    }
}

#[async_trait]
impl Exporter for PostgresExporter {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self, table: &ExportTable) -> Result<()> {
        self.target.create_schema(&self.schema).await?;
        self.target
            .ensure_table(&self.schema, &table.target_table, &table.columns)
            .await
    }

    async fn write(&self, batch: Arc<ExportBatch>) -> Result<u64> {
        let table = &batch.table;
        let mut rows_written = 0;
        for chunk in batch.rows.chunks(self.rows_per_statement(table.columns.len())) {
            rows_written += self
                .target
                .insert_batch(&self.schema, &table.target_table, &table.columns, chunk)
                .await?;
            debug!(
                "{}: inserted {} of {} rows",
                table.target_table,
                rows_written,
                batch.rows.len()
            );
        }
        Ok(rows_written)
    }

    async fn finish(&self, _table: &ExportTable, rows_written: u64) -> Result<ExportOutcome> {
        Ok(ExportOutcome {
            files: Vec::new(),
            rows_written,
        })
    }

    async fn export_sequences(&self, sequences: &[SequenceDeclaration]) -> Result<ExportOutcome> {
        if sequences.is_empty() {
            return Ok(ExportOutcome::default());
        }
        self.target.create_schema(&self.schema).await?;
        for sequence in sequences {
            self.target.apply_sequence(&self.schema, sequence).await?;
        }
        Ok(ExportOutcome::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::{batch, table};
    use crate::target::{SqlValue, TargetColumn};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TargetStore for RecordingStore {
        async fn create_schema(&self, schema: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("schema {}", schema));
            Ok(())
        }

        async fn ensure_table(&self, _: &str, table: &str, _: &[TargetColumn]) -> Result<()> {
            self.calls.lock().unwrap().push(format!("table {}", table));
            Ok(())
        }

        async fn insert_batch(
            &self,
            _: &str,
            _: &str,
            _: &[TargetColumn],
            rows: &[Vec<SqlValue>],
        ) -> Result<u64> {
            self.calls.lock().unwrap().push(format!("insert {}", rows.len()));
            Ok(rows.len() as u64)
        }

        async fn apply_sequence(&self, _: &str, sequence: &SequenceDeclaration) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("sequence {} {}", sequence.name, sequence.start));
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_inserts_in_batches() {
        let store = Arc::new(RecordingStore::default());
        let exporter = PostgresExporter::new(store.clone(), "public", 1);
        exporter.begin(&table()).await.unwrap();
        let written = exporter.write(batch()).await.unwrap();
        let outcome = exporter.finish(&table(), written).await.unwrap();
        assert_eq!(outcome.rows_written, 2);
        assert!(outcome.files.is_empty());
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec!["schema public", "table customers", "insert 1", "insert 1"]
        );
    }

    #[tokio::test]
    async fn test_applies_sequences() {
        let store = Arc::new(RecordingStore::default());
        let exporter = PostgresExporter::new(store.clone(), "public", 1000);
        exporter
            .export_sequences(&[SequenceDeclaration {
                name: "counter_seq".to_string(),
                source_table: "tblCounter".to_string(),
                start: 501,
            }])
            .await
            .unwrap();
        assert_eq!(
            store.calls.lock().unwrap().last().unwrap(),
            "sequence counter_seq 501"
        );
    }

    #[test]
    fn test_statement_size_respects_parameter_limit() {
        let exporter = PostgresExporter::new(Arc::new(RecordingStore::default()), "public", 10_000);
        assert_eq!(exporter.rows_per_statement(2), 10_000);
        assert_eq!(exporter.rows_per_statement(20), 3_276);
    }
}
