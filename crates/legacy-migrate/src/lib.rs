//! # legacy-migrate
//!
//! Migration pipeline from legacy desktop shop databases (oil & gas pipe,
//! threading and inspection shops) to PostgreSQL.
//!
//! A job reads one tabular export per legacy table and then, table by table:
//!
//! - **Analyzes** the export: columns, inferred types, foreign-key style
//!   relationships and a dependency-ordered processing plan
//! - **Validates** records against required columns and typed business rules
//! - **Normalizes** domain values (pipe grades, fractional sizes, thread
//!   connections, work-order numbers, customer names) and coerces types
//! - **Exports** valid records as CSV, psql import scripts and optionally
//!   straight into PostgreSQL
//!
//! Legacy counter tables become target sequences instead of data.
//!
//! ## Example
//!
//! ```rust,no_run
//! use legacy_migrate::{report, Config, Orchestrator};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> legacy_migrate::Result<()> {
//!     let mut config = Config::load("config.json")?;
//!     config.company = "acme".to_string();
//!     let orchestrator = Orchestrator::new(config)?;
//!     let job = orchestrator.run(Path::new("exports/acme")).await?;
//!     println!("{}", report::console_summary(&job));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod job;
pub mod normalize;
pub mod orchestrator;
pub mod report;
pub mod rules;
pub mod schema;
pub mod target;
pub mod transform;
pub mod typemap;
pub mod validate;

// Re-exports for convenient access
pub use config::{Config, MappingRepository};
pub use error::{MigrateError, Result};
pub use job::{CompletedJob, ConversionJob, JobStatus, ProcessingError};
pub use orchestrator::{Orchestrator, ProgressUpdate};
pub use report::JobReport;
pub use schema::ProcessingPlan;
pub use target::{SqlValue, TargetRegistry};
