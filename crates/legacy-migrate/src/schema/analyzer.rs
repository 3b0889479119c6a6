//! Discovers tables and columns in a directory of delimited exports.

use super::{ColumnInfo, ProcessingPlan, TableInfo};
use crate::config::MappingRepository;
use crate::error::{MigrateError, Result};
use crate::transform::normalize_identifier;
use crate::typemap::{infer_from_samples, ColumnType};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Non-empty values kept per column for type inference.
pub const SAMPLE_SIZE: usize = 5;

const TABLE_EXTENSIONS: &[&str] = &["csv", "txt", "tsv"];

/// Reads headers and row counts and builds the processing plan.
pub struct SchemaAnalyzer<'a> {
    repo: &'a MappingRepository,
}

impl<'a> SchemaAnalyzer<'a> {
    pub fn new(repo: &'a MappingRepository) -> Self {
        Self { repo }
    }

    /// Analyze every table file under `source`.
    ///
    /// Fails only when the directory cannot be read or holds no tables.
    /// Individual unreadable files are reported on the plan.
    pub fn analyze(&self, source: &Path) -> Result<ProcessingPlan> {
        let files = discover_files(source)?;
        info!("Discovered {} table files in {}", files.len(), source.display());

        let mut tables = Vec::with_capacity(files.len());
        let mut unreadable = Vec::new();
        for path in files {
            let stem = table_name(&path);
            match self.describe_table(&stem, &path) {
                Ok(table) => {
                    debug!(
                        "{}: {} columns, {} rows",
                        table.original_name,
                        table.columns.len(),
                        table.record_count
                    );
                    tables.push(table);
                }
                Err(e) => {
                    warn!("Cannot read table {}: {}", stem, e);
                    unreadable.push((stem, e.to_string()));
                }
            }
        }

        Ok(ProcessingPlan::build(tables, unreadable))
    }

    fn describe_table(&self, name: &str, path: &Path) -> Result<TableInfo> {
        let delimiter = delimiter_for(path);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_path(path)
            .map_err(|e| MigrateError::extraction(name, e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| MigrateError::extraction(name, e.to_string()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut samples: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        let mut record_count = 0u64;
        for result in reader.records() {
            record_count += 1;
            let Ok(record) = result else { continue };
            for (i, value) in record.iter().enumerate().take(headers.len()) {
                let value = value.trim();
                if !value.is_empty() && samples[i].len() < SAMPLE_SIZE {
                    samples[i].push(value.to_string());
                }
            }
        }

        let is_counter_table = self.repo.is_counter_table(name);
        let target = if is_counter_table {
            String::new()
        } else {
            self.repo.target_table_name(name)
        };

        Ok(TableInfo {
            name: target,
            original_name: name.to_string(),
            path: path.to_path_buf(),
            delimiter,
            columns: self.describe_columns(name, &headers, samples),
            record_count,
            relationships: Vec::new(),
            dependencies: Vec::new(),
            priority: 0,
            is_counter_table,
        })
    }

    fn describe_columns(
        &self,
        table: &str,
        headers: &[String],
        samples: Vec<Vec<String>>,
    ) -> Vec<ColumnInfo> {
        let mut used = HashSet::new();
        headers
            .iter()
            .zip(samples)
            .enumerate()
            .map(|(index, (header, samples))| {
                let original = if header.is_empty() {
                    format!("column_{}", index + 1)
                } else {
                    header.clone()
                };

                let resolved = self.repo.column_mapping(table, &original);
                let mut target = match resolved {
                    Some(r) => r.target.to_string(),
                    None => normalize_identifier(&original),
                };
                if target.is_empty() {
                    target = format!("column_{}", index + 1);
                }
                let target = dedupe(target, &mut used);

                let mapping = resolved.and_then(|r| r.mapping);
                let required = mapping.is_some_and(|m| m.required)
                    || self.repo.is_required_column(table, &original, &target);
                let business_rules = self
                    .repo
                    .rules_for(table, &original, &target)
                    .iter()
                    .map(|r| r.rule.name.clone())
                    .collect();

                ColumnInfo {
                    original_type: infer_from_samples(samples.iter().map(String::as_str)),
                    target_type: mapping.map_or(ColumnType::Text, |m| m.data_type),
                    nullable: !required,
                    default: mapping.and_then(|m| m.default.clone()),
                    normalizers: mapping.map(|m| m.rules.clone()).unwrap_or_default(),
                    normalizer_severity: mapping.map(|m| m.severity).unwrap_or_default(),
                    business_rules,
                    sample_values: samples,
                    name: target,
                    original_name: original,
                    index,
                }
            })
            .collect()
    }
}

fn dedupe(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", name, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn discover_files(source: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(source).map_err(|e| {
        MigrateError::SchemaDiscovery(format!("cannot read {}: {}", source.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_table_file(path))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(MigrateError::SchemaDiscovery(format!(
            "no tables found in {}",
            source.display()
        )));
    }
    Ok(files)
}

fn is_table_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TABLE_EXTENSIONS.iter().any(|t| t.eq_ignore_ascii_case(ext)))
}

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

fn table_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}
