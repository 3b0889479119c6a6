//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::normalize::MAX_WORK_ORDER_WIDTH;
use crate::rules::CompiledRule;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let processing = &config.processing_options;
    if let Some(0) = processing.workers {
        return Err(MigrateError::Config(
            "processing_options.workers must be at least 1".into(),
        ));
    }
    if processing.batch_size == 0 {
        return Err(MigrateError::Config(
            "processing_options.batch_size must be at least 1".into(),
        ));
    }

    for (name, table) in &config.table_mappings {
        if table.is_counter_table {
            if !table.target_table.is_empty() {
                return Err(MigrateError::Config(format!(
                    "table_mappings.{}: counter table cannot have a target table",
                    name
                )));
            }
            if table.sequence_name.trim().is_empty() {
                return Err(MigrateError::Config(format!(
                    "table_mappings.{}: counter table needs a sequence_name",
                    name
                )));
            }
        }
    }

    for (name, column) in &config.oil_gas_mappings {
        if column.target_column.trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "oil_gas_mappings.{}: target_column is required",
                name
            )));
        }
    }

    for rule in &config.validation_rules.business_rules {
        CompiledRule::compile(rule.clone())?;
    }

    let width = config.normalization.work_order_width;
    if width == 0 || width > MAX_WORK_ORDER_WIDTH {
        return Err(MigrateError::Config(format!(
            "normalization.work_order_width must be between 1 and {}",
            MAX_WORK_ORDER_WIDTH
        )));
    }

    if config.output.direct {
        if config.database_config.host.is_empty() {
            return Err(MigrateError::Config(
                "database_config.host is required for direct export".into(),
            ));
        }
        if config.database_config.database.is_empty() && config.company.is_empty() {
            return Err(MigrateError::Config(
                "database_config.database or a company is required for direct export".into(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableMapping;
    use crate::rules::{BusinessRule, RangeMeasure, RuleKind, Severity};

    fn valid_config() -> Config {
        Config::builtin()
    }

    fn rule(kind: RuleKind) -> BusinessRule {
        BusinessRule {
            name: "r".to_string(),
            table: None,
            column: "grade".to_string(),
            kind,
            severity: Severity::Error,
            message: None,
            suggested_fix: None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.processing_options.workers = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.processing_options.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_work_order_width_bounds() {
        let mut config = valid_config();
        config.normalization.work_order_width = 0;
        assert!(validate(&config).is_err());
        config.normalization.work_order_width = 1_000_000_000;
        assert!(matches!(validate(&config), Err(MigrateError::Config(_))));
        config.normalization.work_order_width = 8;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_counter_table_with_target_rejected() {
        let mut config = valid_config();
        let mut mapping = TableMapping::counter("x_seq");
        mapping.target_table = "x".to_string();
        config.table_mappings.insert("tblX".to_string(), mapping);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_counter_table_without_sequence_rejected() {
        let mut config = valid_config();
        config
            .table_mappings
            .insert("tblX".to_string(), TableMapping::counter(""));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_rules_rejected() {
        let mut config = valid_config();
        config.validation_rules.business_rules = vec![rule(RuleKind::Format {
            pattern: "[unclosed".to_string(),
        })];
        assert!(validate(&config).is_err());

        config.validation_rules.business_rules = vec![rule(RuleKind::Range {
            min: Some(10.0),
            max: Some(1.0),
            measure: RangeMeasure::Value,
        })];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_direct_export_requires_host() {
        let mut config = valid_config();
        config.output.direct = true;
        config.company = "Acme".to_string();
        assert!(validate(&config).is_err());
        config.database_config.host = "localhost".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_database_config_debug_redacts_password() {
        let mut config = valid_config();
        config.database_config.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.database_config);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
