//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
///
/// Record-level problems never surface here; they are collected as
/// [`ProcessingError`](crate::job::ProcessingError) entries on the job.
/// This enum covers failures that stop a table, a sink or the whole run.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (unparseable override file, invalid option, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source export could not be read or contained no tables.
    #[error("Schema discovery failed: {0}")]
    SchemaDiscovery(String),

    /// A single table could not be read.
    #[error("Extraction failed for table {table}: {message}")]
    Extraction { table: String, message: String },

    /// An output sink failed for a table.
    #[error("Export failed for table {table}: {message}")]
    Export { table: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Condition that aborts the whole job.
    #[error("Critical error: {0}")]
    Critical(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Delimited text read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create an Extraction error
    pub fn extraction(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Extraction {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Export error
    pub fn export(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Export {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the job regardless of `continue_on_error`.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            MigrateError::Critical(_)
                | MigrateError::SchemaDiscovery(_)
                | MigrateError::Pool { .. }
                | MigrateError::Target(_)
        )
    }

    /// Process exit code for a run that failed with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Json(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Critical(_) | MigrateError::SchemaDiscovery(_) => 3,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
