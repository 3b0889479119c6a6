//! Row extraction from delimited legacy exports.
//!
//! Reading happens on the blocking pool and is handed to the async side in
//! chunks over a bounded channel, so a slow consumer applies backpressure
//! to the reader.

use crate::error::{MigrateError, Result};
use crate::schema::TableInfo;
use csv::ReaderBuilder;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One data row, padded or truncated to the header width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based data row number (header excluded).
    pub number: u64,
    pub values: Vec<String>,
}

impl RawRecord {
    pub fn new(number: u64, values: Vec<String>) -> Self {
        Self { number, values }
    }

    /// Value at `index`, empty when absent.
    pub fn get(&self, index: usize) -> &str {
        self.values.get(index).map(String::as_str).unwrap_or("")
    }
}

/// A row the reader could not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub number: u64,
    pub message: String,
}

/// A batch of rows read from one table.
#[derive(Debug, Default)]
pub struct RowChunk {
    pub records: Vec<RawRecord>,
    pub skipped: Vec<SkippedRow>,
    pub read_time: Duration,
}

/// Totals of a finished extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub rows_reshaped: u64,
}

/// Reads tables in chunks.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    pub chunk_size: usize,
    pub read_ahead: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            read_ahead: 4,
        }
    }
}

impl Extractor {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            ..Default::default()
        }
    }

    /// Stream a table's rows on the blocking pool.
    ///
    /// The handle resolves to the extraction totals, or an error if the
    /// file could not be opened. Dropping the receiver stops the reader.
    pub fn stream(
        &self,
        table: &TableInfo,
    ) -> (mpsc::Receiver<RowChunk>, JoinHandle<Result<ExtractSummary>>) {
        let (tx, rx) = mpsc::channel(self.read_ahead.max(1));
        let table = table.clone();
        let chunk_size = self.chunk_size;
        let handle = tokio::task::spawn_blocking(move || {
            read_chunks(&table, chunk_size, |chunk| tx.blocking_send(chunk).is_ok())
        });
        (rx, handle)
    }

    /// Read a whole table into memory.
    pub fn read_all(&self, table: &TableInfo) -> Result<(Vec<RawRecord>, Vec<SkippedRow>)> {
        let mut records = Vec::new();
        let mut skipped = Vec::new();
        read_chunks(table, self.chunk_size, |chunk| {
            records.extend(chunk.records);
            skipped.extend(chunk.skipped);
            true
        })?;
        Ok((records, skipped))
    }
}

/// Read `table` and hand chunks to `sink` until it returns false.
///
/// An empty file yields zero rows. Rows with the wrong field count are
/// padded or truncated; rows that fail to parse are skipped.
fn read_chunks(
    table: &TableInfo,
    chunk_size: usize,
    mut sink: impl FnMut(RowChunk) -> bool,
) -> Result<ExtractSummary> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(table.delimiter)
        .from_path(&table.path)
        .map_err(|e| MigrateError::extraction(&table.original_name, e.to_string()))?;

    let width = table.columns.len();
    let mut summary = ExtractSummary::default();
    let mut chunk = RowChunk::default();
    let mut started = Instant::now();

    for result in reader.records() {
        summary.rows_read += 1;
        let number = summary.rows_read;
        match result {
            Ok(record) => {
                let mut values: Vec<String> = record.iter().map(str::to_string).collect();
                if values.len() != width {
                    summary.rows_reshaped += 1;
                    values.resize(width, String::new());
                }
                chunk.records.push(RawRecord::new(number, values));
            }
            Err(e) => {
                summary.rows_skipped += 1;
                warn!("{} row {}: skipped unparseable row: {}", table.original_name, number, e);
                chunk.skipped.push(SkippedRow {
                    number,
                    message: e.to_string(),
                });
            }
        }

        if chunk.records.len() + chunk.skipped.len() >= chunk_size {
            chunk.read_time = started.elapsed();
            if !sink(std::mem::take(&mut chunk)) {
                debug!("{}: consumer went away, stopping read", table.original_name);
                return Ok(summary);
            }
            started = Instant::now();
        }
    }

    if !chunk.records.is_empty() || !chunk.skipped.is_empty() {
        chunk.read_time = started.elapsed();
        sink(chunk);
    }

    if summary.rows_reshaped > 0 {
        debug!(
            "{}: {} rows padded or truncated to {} fields",
            table.original_name, summary.rows_reshaped, width
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MappingRepository};
    use crate::schema::SchemaAnalyzer;
    use std::fs;

    fn table_from(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> TableInfo {
        fs::write(dir.path().join(name), bytes).unwrap();
        let repo = MappingRepository::new(Config::builtin()).unwrap();
        let plan = SchemaAnalyzer::new(&repo).analyze(dir.path()).unwrap();
        plan.tables[0].clone()
    }

    #[test]
    fn test_pads_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_from(&dir, "tblRig.csv", b"A,B,C\n1,2\n1,2,3,4\n1,2,3\n");
        let (records, skipped) = Extractor::default().read_all(&table).unwrap();
        assert!(skipped.is_empty());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].values, vec!["1", "2", ""]);
        assert_eq!(records[1].values, vec!["1", "2", "3"]);
        assert_eq!(records[2].number, 3);
    }

    #[test]
    fn test_header_only_file_yields_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_from(&dir, "tblRig.csv", b"A,B\n");
        let (records, skipped) = Extractor::default().read_all(&table).unwrap();
        assert!(records.is_empty());
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_unparseable_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_from(&dir, "tblRig.csv", b"A,B\nok,1\n\xff\xfe,2\nfine,3\n");
        let (records, skipped) = Extractor::default().read_all(&table).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].number, 2);
        assert_eq!(records[1].number, 3);
    }

    #[test]
    fn test_missing_file_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = table_from(&dir, "tblRig.csv", b"A\n1\n");
        table.path = dir.path().join("gone.csv");
        let err = Extractor::default().read_all(&table).unwrap_err();
        assert!(matches!(err, MigrateError::Extraction { .. }));
    }

    #[tokio::test]
    async fn test_stream_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("A\n");
        for i in 0..25 {
            csv.push_str(&format!("{}\n", i));
        }
        let table = table_from(&dir, "tblRig.csv", csv.as_bytes());

        let (mut rx, handle) = Extractor::new(10).stream(&table);
        let mut sizes = Vec::new();
        while let Some(chunk) = rx.recv().await {
            sizes.push(chunk.records.len());
        }
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(summary.rows_read, 25);
    }
}
