//! Delimited text sink.

use super::{ExportBatch, ExportOutcome, ExportTable, Exporter};
use crate::error::{MigrateError, Result};
use crate::job::{OutputFile, OutputKind};
use crate::transform::SequenceDeclaration;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes `<target_table>.csv` with a header row and standard quoting.
/// NULL is written as an empty field.
pub struct CsvExporter {
    directory: PathBuf,
}

impl CsvExporter {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn file_path(&self, target_table: &str) -> PathBuf {
        self.directory.join(format!("{}.csv", target_table))
    }
}

fn write_header(path: &Path, table: &ExportTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = ::csv::Writer::from_path(path)?;
    writer.write_record(table.columns.iter().map(|c| c.name.as_str()))?;
    writer.flush()?;
    Ok(())
}

fn append_rows(path: &Path, batch: &ExportBatch) -> Result<u64> {
    let file = OpenOptions::new().append(true).open(path)?;
    let mut writer = ::csv::Writer::from_writer(file);
    for row in &batch.rows {
        writer.write_record(row.iter().map(|v| v.to_text()))?;
    }
    writer.flush()?;
    Ok(batch.rows.len() as u64)
}

/// Run blocking file I/O off the async runtime.
async fn blocking<T, F>(table: &str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MigrateError::export(table, format!("writer task failed: {}", e)))?
}

#[async_trait]
impl Exporter for CsvExporter {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn begin(&self, table: &ExportTable) -> Result<()> {
        let path = self.file_path(&table.target_table);
        let owned = table.clone();
        blocking(&table.source_table, move || write_header(&path, &owned)).await
    }

    async fn write(&self, batch: Arc<ExportBatch>) -> Result<u64> {
        let path = self.file_path(&batch.table.target_table);
        let table = batch.table.source_table.clone();
        blocking(&table, move || append_rows(&path, &batch)).await
    }

    async fn finish(&self, table: &ExportTable, rows_written: u64) -> Result<ExportOutcome> {
        let path = self.file_path(&table.target_table);
        Ok(ExportOutcome {
            files: vec![OutputFile::from_path(path, OutputKind::Csv)?],
            rows_written,
        })
    }

    async fn export_sequences(&self, _sequences: &[SequenceDeclaration]) -> Result<ExportOutcome> {
        Ok(ExportOutcome::default())
    }
}
