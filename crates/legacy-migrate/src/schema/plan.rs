//! Relationship inference and dependency-ordered processing plan.

use super::{Relationship, TableInfo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// Tables grouped into dependency levels.
///
/// Every table in level `n` only references tables in levels `< n`, except
/// tables caught in a reference cycle, which share the final level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingPlan {
    /// All readable tables ordered by level, then name.
    pub tables: Vec<TableInfo>,

    /// Source table names per level.
    pub levels: Vec<Vec<String>>,

    /// Tables whose file could not be read, with the reason.
    pub unreadable: Vec<(String, String)>,

    /// Tables that were part of a reference cycle.
    pub cyclic: Vec<String>,
}

impl ProcessingPlan {
    pub fn build(mut tables: Vec<TableInfo>, unreadable: Vec<(String, String)>) -> Self {
        infer_relationships(&mut tables);

        let deps: BTreeMap<String, BTreeSet<String>> = tables
            .iter()
            .map(|t| {
                (
                    t.original_name.clone(),
                    t.dependencies.iter().cloned().collect(),
                )
            })
            .collect();
        let (levels, cyclic) = dependency_levels(&deps);

        let level_of: HashMap<&str, usize> = levels
            .iter()
            .enumerate()
            .flat_map(|(i, names)| names.iter().map(move |n| (n.as_str(), i)))
            .collect();
        for table in &mut tables {
            table.priority = level_of
                .get(table.original_name.as_str())
                .copied()
                .unwrap_or(0);
        }
        tables.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.original_name.cmp(&b.original_name))
        });

        Self {
            tables,
            levels,
            unreadable,
            cyclic,
        }
    }

    /// Case-insensitive lookup by source name.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.original_name.eq_ignore_ascii_case(name))
    }

    pub fn total_records(&self) -> u64 {
        self.tables.iter().map(|t| t.record_count).sum()
    }

    /// Human-readable summary of the plan.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (i, level) in self.levels.iter().enumerate() {
            out.push_str(&format!("Level {}:\n", i));
            for name in level {
                if let Some(table) = self.table(name) {
                    let target = if table.is_counter_table {
                        "(sequence)".to_string()
                    } else {
                        table.name.clone()
                    };
                    let mut line = format!(
                        "  {} -> {} ({} rows, {} columns)",
                        table.original_name,
                        target,
                        table.record_count,
                        table.columns.len()
                    );
                    if table.is_empty() {
                        line.push_str(" [empty, skipped]");
                    }
                    if !table.dependencies.is_empty() {
                        line.push_str(&format!(" depends on {}", table.dependencies.join(", ")));
                    }
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }
        for (name, reason) in &self.unreadable {
            out.push_str(&format!("Unreadable: {} ({})\n", name, reason));
        }
        out
    }
}

/// Key used to match a column base name against table names.
fn table_key(name: &str) -> String {
    let lower = name.to_lowercase();
    let stripped = lower.strip_prefix("tbl").unwrap_or(&lower);
    let stripped = stripped.trim_matches('_');
    stripped.strip_suffix('s').unwrap_or(stripped).to_string()
}

/// Base of a foreign-key-like column name (`CustomerID` -> `Customer`).
fn reference_base(column: &str) -> Option<&str> {
    let base = if let Some(b) = column.strip_suffix("_id").or_else(|| column.strip_suffix("_ID")) {
        b
    } else {
        column
            .strip_suffix("ID")
            .or_else(|| column.strip_suffix("Id"))?
    };
    let base = base.trim_end_matches('_');
    (!base.is_empty()).then_some(base)
}

/// Fill `relationships` and `dependencies` from column names.
pub fn infer_relationships(tables: &mut [TableInfo]) {
    let keys: HashMap<String, String> = tables
        .iter()
        .map(|t| (table_key(&t.original_name), t.original_name.clone()))
        .collect();

    for table in tables.iter_mut() {
        let mut relationships = Vec::new();
        for column in &table.columns {
            let Some(base) = reference_base(&column.original_name) else {
                continue;
            };
            let Some(referenced) = keys.get(&table_key(base)) else {
                continue;
            };
            if referenced.eq_ignore_ascii_case(&table.original_name) {
                continue;
            }
            relationships.push(Relationship {
                column: column.original_name.clone(),
                references: referenced.clone(),
            });
        }
        let mut dependencies: Vec<String> =
            relationships.iter().map(|r| r.references.clone()).collect();
        dependencies.sort();
        dependencies.dedup();
        table.relationships = relationships;
        table.dependencies = dependencies;
    }
}

/// Kahn's algorithm, one level at a time. Returns the levels and the
/// names left over in cycles (appended as a final level).
fn dependency_levels(deps: &BTreeMap<String, BTreeSet<String>>) -> (Vec<Vec<String>>, Vec<String>) {
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = deps
        .iter()
        .map(|(name, d)| {
            (
                name.as_str(),
                d.iter()
                    .map(String::as_str)
                    .filter(|dep| deps.contains_key(*dep))
                    .collect(),
            )
        })
        .collect();

    let mut levels = Vec::new();
    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, d)| d.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            break;
        }
        for name in &ready {
            remaining.remove(name);
        }
        for d in remaining.values_mut() {
            for name in &ready {
                d.remove(name);
            }
        }
        levels.push(ready.iter().map(|s| s.to_string()).collect());
    }

    let cyclic: Vec<String> = remaining.keys().map(|s| s.to_string()).collect();
    if !cyclic.is_empty() {
        warn!(
            "Reference cycle among {}; processing them last",
            cyclic.join(", ")
        );
        levels.push(cyclic.clone());
    }
    (levels, cyclic)
}
