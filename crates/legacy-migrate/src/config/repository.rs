//! Case-insensitive lookups over the merged mapping configuration.

use super::{ColumnMapping, Config, TableMapping};
use crate::error::Result;
use crate::rules::CompiledRule;
use crate::transform::normalize_identifier;
use std::collections::HashMap;

/// Where a legacy column ends up and which mapping governs its values.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedColumn<'a> {
    pub target: &'a str,
    pub mapping: Option<&'a ColumnMapping>,
}

/// Indexed view of a [`Config`] with business rules compiled once.
#[derive(Debug)]
pub struct MappingRepository {
    config: Config,
    tables: HashMap<String, String>,
    rules: Vec<CompiledRule>,
}

impl MappingRepository {
    pub fn new(config: Config) -> Result<Self> {
        let tables = config
            .table_mappings
            .keys()
            .map(|k| (k.to_lowercase(), k.clone()))
            .collect();
        let rules = config
            .validation_rules
            .business_rules
            .iter()
            .cloned()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            tables,
            rules,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get_table_mapping(&self, name: &str) -> Option<&TableMapping> {
        self.tables
            .get(&name.to_lowercase())
            .and_then(|key| self.config.table_mappings.get(key))
    }

    pub fn is_counter_table(&self, name: &str) -> bool {
        self.get_table_mapping(name)
            .is_some_and(|m| m.is_counter_table)
    }

    /// Database name for a tenant: the configured name, or prefix plus the
    /// sanitized tenant.
    pub fn get_target_database_name(&self, tenant: &str) -> String {
        let db = &self.config.database_config;
        if !db.database.is_empty() {
            return db.database.clone();
        }
        let sanitized: String = tenant
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}{}", db.database_prefix, sanitized)
    }

    /// Target table for a legacy table: the mapped name, or the generic
    /// identifier normalization.
    pub fn target_table_name(&self, table: &str) -> String {
        match self.get_table_mapping(table) {
            Some(m) if !m.target_table.is_empty() => m.target_table.clone(),
            _ => normalize_identifier(table),
        }
    }

    /// Resolve a legacy header: explicit table rename first, then a logical
    /// field whose source spelling matches.
    pub fn column_mapping<'a>(&'a self, table: &str, column: &str) -> Option<ResolvedColumn<'a>> {
        let header = column.trim();
        if let Some(table_mapping) = self.get_table_mapping(table) {
            let renamed = table_mapping
                .columns
                .iter()
                .find(|(source, _)| source.eq_ignore_ascii_case(header));
            if let Some((_, target)) = renamed {
                let mapping = self
                    .config
                    .oil_gas_mappings
                    .iter()
                    .find(|(key, m)| {
                        key.eq_ignore_ascii_case(target) || m.target_column.eq_ignore_ascii_case(target)
                    })
                    .map(|(_, m)| m);
                return Some(ResolvedColumn {
                    target: target.as_str(),
                    mapping,
                });
            }
        }

        self.config
            .oil_gas_mappings
            .values()
            .find(|m| m.matches(header))
            .map(|m| ResolvedColumn {
                target: m.target_column.as_str(),
                mapping: Some(m),
            })
    }

    /// Business rules bound to a column, in declaration order.
    pub fn rules_for(&self, table: &str, source_column: &str, target_column: &str) -> Vec<&CompiledRule> {
        self.rules
            .iter()
            .filter(|r| r.rule.applies_to(table, source_column, target_column))
            .collect()
    }

    /// Column listed under `validation_rules.required_columns` for the table.
    pub fn is_required_column(&self, table: &str, source_column: &str, target_column: &str) -> bool {
        self.config
            .validation_rules
            .required_columns
            .iter()
            .filter(|(t, _)| t.eq_ignore_ascii_case(table) || t.as_str() == "*")
            .flat_map(|(_, cols)| cols)
            .any(|c| c.eq_ignore_ascii_case(source_column) || c.eq_ignore_ascii_case(target_column))
    }

    pub fn required_tables(&self) -> &[String] {
        &self.config.validation_rules.required_tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BusinessRule, RuleKind, Severity};

    fn repo() -> MappingRepository {
        let mut config = Config::builtin();
        config.company = "Acme".to_string();
        config
            .table_mappings
            .get_mut("tblCustomer")
            .unwrap()
            .columns
            .insert("CustNm".to_string(), "customer_name".to_string());
        config.validation_rules.business_rules = vec![
            BusinessRule {
                name: "grade_enum".to_string(),
                table: None,
                column: "grade".to_string(),
                kind: RuleKind::Enum {
                    values: vec!["J55".to_string()],
                },
                severity: Severity::Error,
                message: None,
                suggested_fix: None,
            },
            BusinessRule {
                name: "wo_only".to_string(),
                table: Some("tblWorkOrder".to_string()),
                column: "grade".to_string(),
                kind: RuleKind::Required,
                severity: Severity::Warning,
                message: None,
                suggested_fix: None,
            },
        ];
        MappingRepository::new(config).unwrap()
    }

    #[test]
    fn test_table_lookup_is_case_insensitive() {
        let repo = repo();
        assert!(repo.get_table_mapping("TBLCUSTOMER").is_some());
        assert!(repo.is_counter_table("tblworkordercounter"));
        assert!(!repo.is_counter_table("tblCustomer"));
        assert!(repo.get_table_mapping("tblNothing").is_none());
    }

    #[test]
    fn test_target_database_name() {
        let repo = repo();
        assert_eq!(repo.get_target_database_name("Acme Tubulars, Inc"), "tenant_acme_tubulars__inc");
    }

    #[test]
    fn test_target_table_name_falls_back_to_generic() {
        let repo = repo();
        assert_eq!(repo.target_table_name("tblCustomer"), "customers");
        assert_eq!(repo.target_table_name("Rig Schedule"), "rig_schedule");
    }

    #[test]
    fn test_column_resolution_order() {
        let repo = repo();
        let renamed = repo.column_mapping("tblCustomer", "custnm").unwrap();
        assert_eq!(renamed.target, "customer_name");
        assert!(renamed.mapping.is_some_and(|m| m.required));

        let by_source = repo.column_mapping("tblInventory", "PipeGrade").unwrap();
        assert_eq!(by_source.target, "grade");

        assert!(repo.column_mapping("tblInventory", "Remarks").is_none());
    }

    #[test]
    fn test_rules_for_respects_table_binding() {
        let repo = repo();
        let names: Vec<&str> = repo
            .rules_for("tblWorkOrder", "Grade", "grade")
            .iter()
            .map(|r| r.rule.name.as_str())
            .collect();
        assert_eq!(names, vec!["grade_enum", "wo_only"]);
        assert_eq!(repo.rules_for("tblInventory", "Grade", "grade").len(), 1);
    }
}
