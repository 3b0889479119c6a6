//! Relational import script sink.

use super::{ExportBatch, ExportOutcome, ExportTable, Exporter};
use crate::config::SqlMode;
use crate::error::{MigrateError, Result};
use crate::job::{OutputFile, OutputKind};
use crate::target::{create_table_ddl, qualify_table, quote_ident, quote_literal, sequence_ddl};
use crate::transform::SequenceDeclaration;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// File name of the script holding every sequence declaration.
pub const SEQUENCES_FILE: &str = "sequences.sql";

/// Writes `<target_table>.sql` for psql.
///
/// In copy mode the script bulk-loads the CSV written next to it and must
/// be run from the output directory; in insert mode it carries literal
/// INSERT statements of at most `batch_size` rows each.
pub struct SqlScriptExporter {
    directory: PathBuf,
    schema: String,
    mode: SqlMode,
    batch_size: usize,
}

impl SqlScriptExporter {
    pub fn new(directory: impl AsRef<Path>, schema: &str, mode: SqlMode, batch_size: usize) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            schema: schema.to_string(),
            mode,
            batch_size: batch_size.max(1),
        }
    }

    fn column_list(table: &ExportTable) -> String {
        table
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Opening of a table's import script: transaction, DDL and, in copy
    /// mode, the bulk-load statement.
    pub fn render_header(&self, table: &ExportTable) -> String {
        let qualified = qualify_table(&self.schema, &table.target_table);
        let mut script = String::new();
        let _ = writeln!(script, "-- {} -> {}", table.source_table, qualified);
        script.push_str("BEGIN;\n");
        let _ = writeln!(script, "CREATE SCHEMA IF NOT EXISTS {};", quote_ident(&self.schema));
        let _ = writeln!(
            script,
            "{};",
            create_table_ddl(&self.schema, &table.target_table, &table.columns)
        );
        if self.mode == SqlMode::Copy {
            let _ = writeln!(
                script,
                "\\copy {} ({}) FROM {} WITH (FORMAT csv, HEADER true)",
                qualified,
                Self::column_list(table),
                quote_literal(&format!("{}.csv", table.target_table))
            );
        }
        script
    }

    /// INSERT statements of at most `batch_size` rows each. Empty in copy
    /// mode, where the rows live in the CSV.
    pub fn render_rows(&self, batch: &ExportBatch) -> String {
        let mut script = String::new();
        if self.mode == SqlMode::Copy {
            return script;
        }
        let table = qualify_table(&self.schema, &batch.table.target_table);
        let col_list = Self::column_list(&batch.table);
        for chunk in batch.rows.chunks(self.batch_size) {
            let _ = writeln!(script, "INSERT INTO {} ({}) VALUES", table, col_list);
            let values: Vec<String> = chunk
                .iter()
                .map(|row| {
                    let literals: Vec<String> = row.iter().map(|v| v.to_sql_literal()).collect();
                    format!("    ({})", literals.join(", "))
                })
                .collect();
            script.push_str(&values.join(",\n"));
            script.push_str(";\n");
        }
        script
    }

    pub fn render_footer(&self, rows_written: u64) -> String {
        format!("-- {} rows\nCOMMIT;\n", rows_written)
    }

    /// Render the sequence script.
    pub fn render_sequences(&self, sequences: &[SequenceDeclaration]) -> String {
        let mut script = String::from("-- sequences seeded from legacy counter tables\nBEGIN;\n");
        let _ = writeln!(script, "CREATE SCHEMA IF NOT EXISTS {};", quote_ident(&self.schema));
        for sequence in sequences {
            let _ = writeln!(script, "-- from {}", sequence.source_table);
            for stmt in sequence_ddl(&self.schema, sequence) {
                let _ = writeln!(script, "{};", stmt);
            }
        }
        script.push_str("COMMIT;\n");
        script
    }

    fn script_path(&self, target_table: &str) -> PathBuf {
        self.directory.join(format!("{}.sql", target_table))
    }

    async fn write_file(&self, path: &Path, content: String, table: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| MigrateError::export(table, format!("cannot create output directory: {}", e)))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| MigrateError::export(table, format!("cannot write {}: {}", path.display(), e)))
    }

    async fn append(&self, path: &Path, content: String, table: &str) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(|e| MigrateError::export(table, format!("cannot open {}: {}", path.display(), e)))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| MigrateError::export(table, format!("cannot write {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl Exporter for SqlScriptExporter {
    fn name(&self) -> &'static str {
        "sql"
    }

    async fn begin(&self, table: &ExportTable) -> Result<()> {
        let path = self.script_path(&table.target_table);
        self.write_file(&path, self.render_header(table), &table.source_table)
            .await
    }

    async fn write(&self, batch: Arc<ExportBatch>) -> Result<u64> {
        let script = self.render_rows(&batch);
        if !script.is_empty() {
            let path = self.script_path(&batch.table.target_table);
            self.append(&path, script, &batch.table.source_table).await?;
        }
        Ok(batch.rows.len() as u64)
    }

    async fn finish(&self, table: &ExportTable, rows_written: u64) -> Result<ExportOutcome> {
        let path = self.script_path(&table.target_table);
        self.append(&path, self.render_footer(rows_written), &table.source_table)
            .await?;
        Ok(ExportOutcome {
            files: vec![OutputFile::from_path(path, OutputKind::Sql)?],
            rows_written,
        })
    }

    async fn export_sequences(&self, sequences: &[SequenceDeclaration]) -> Result<ExportOutcome> {
        if sequences.is_empty() {
            return Ok(ExportOutcome::default());
        }
        let path = self.directory.join(SEQUENCES_FILE);
        self.write_file(&path, self.render_sequences(sequences), "sequences")
            .await?;
        Ok(ExportOutcome {
            files: vec![OutputFile::from_path(path, OutputKind::Sql)?],
            rows_written: 0,
        })
    }
}
