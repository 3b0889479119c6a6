//! Configuration loading and validation.
//!
//! Built-in defaults are always present; a JSON (or YAML) file overlays
//! them. Column and table mappings merge by key with the file winning, the
//! option sections are taken from the file with serde defaults filling any
//! field it leaves out.

mod defaults;
mod repository;
mod types;
mod validation;

pub use defaults::{default_column_mappings, default_table_mappings, COUNTER_TABLES};
pub use repository::MappingRepository;
pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

impl Config {
    /// Load configuration from a file over the built-in defaults.
    ///
    /// A missing file is not an error: the defaults apply. A file that
    /// exists but cannot be parsed is a configuration error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No configuration at {}, using built-in defaults", path.display());
            let config = Self::builtin();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    /// Parse a JSON overlay and merge it over the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let overlay: Config = serde_json::from_str(json)?;
        let config = Self::builtin().merge(overlay);
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML overlay and merge it over the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let overlay: Config = serde_yaml::from_str(yaml)?;
        let config = Self::builtin().merge(overlay);
        config.validate()?;
        Ok(config)
    }

    fn merge(mut self, overlay: Config) -> Self {
        debug!(
            "Merging {} column and {} table mappings over defaults",
            overlay.oil_gas_mappings.len(),
            overlay.table_mappings.len()
        );
        self.oil_gas_mappings.extend(overlay.oil_gas_mappings);
        self.table_mappings.extend(overlay.table_mappings);
        Config {
            company: overlay.company,
            database_config: overlay.database_config,
            oil_gas_mappings: self.oil_gas_mappings,
            table_mappings: self.table_mappings,
            processing_options: overlay.processing_options,
            validation_rules: overlay.validation_rules,
            normalization: overlay.normalization,
            output: overlay.output,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// SHA-256 of the canonical JSON form, recorded in job reports.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl DatabaseConfig {
    /// Build a connection string for tokio-postgres.
    pub fn connection_string(&self, database: &str) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, database, self.user, self.password
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::CaseStyle;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.json")).unwrap();
        assert!(config.table_mappings.contains_key("tblCounter"));
        assert_eq!(config.processing_options.batch_size, 1000);
    }

    #[test]
    fn test_unparseable_file_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_overlay_merges_mappings_by_key() {
        let json = r#"{
            "company": "Acme Tubulars",
            "table_mappings": {
                "tblCustomer": { "target_table": "clients" },
                "tblRig": { "target_table": "rigs" }
            },
            "processing_options": { "workers": 2, "dry_run": true },
            "normalization": { "customer_case": "upper" }
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.table_mappings["tblCustomer"].target_table, "clients");
        assert_eq!(config.table_mappings["tblRig"].target_table, "rigs");
        assert!(config.table_mappings["tblWorkOrderCounter"].is_counter_table);
        assert!(config.oil_gas_mappings.contains_key("grade"));
        assert_eq!(config.processing_options.workers, Some(2));
        assert_eq!(config.processing_options.batch_size, 1000);
        assert!(config.processing_options.continue_on_error);
        assert!(config.processing_options.dry_run);
        assert_eq!(config.normalization.customer_case, CaseStyle::Upper);
        assert_eq!(config.normalization.work_order_width, 6);
    }

    #[test]
    fn test_yaml_overlay() {
        let yaml = r#"
company: acme
output:
  sql_mode: insert
  csv: false
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.output.sql_mode, SqlMode::Insert);
        assert!(!config.output.csv);
        assert_eq!(config.output.schema, "public");
    }

    #[test]
    fn test_invalid_overlay_rejected() {
        let json = r#"{ "table_mappings": { "tblCounter": { "is_counter_table": true, "target_table": "x", "sequence_name": "s" } } }"#;
        assert!(Config::from_json(json).is_err());
    }

    #[test]
    fn test_hash_is_stable() {
        let a = Config::builtin();
        let b = Config::builtin();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);

        let mut c = Config::builtin();
        c.company = "other".to_string();
        assert_ne!(a.hash(), c.hash());
    }
}
