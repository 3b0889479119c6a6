//! legacy-migrate CLI - legacy desktop database to PostgreSQL migration.

use clap::{Parser, Subcommand};
use legacy_migrate::report::{self, JobReport};
use legacy_migrate::{Config, MigrateError, Orchestrator, TargetRegistry};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "legacy-migrate")]
#[command(about = "Migrate legacy shop database exports to PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to JSON or YAML configuration file (built-in defaults if missing)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a directory of legacy table exports
    Run {
        /// Directory holding one export file per legacy table
        #[arg(long)]
        source: PathBuf,

        /// Company (tenant) the data belongs to
        #[arg(long)]
        company: String,

        /// Override output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Override number of workers
        #[arg(long)]
        workers: Option<usize>,

        /// Dry run: analyze, validate and transform without writing output
        #[arg(long)]
        dry_run: bool,

        /// Also insert records directly into the target database
        #[arg(long)]
        direct: bool,

        /// Report path [default: <output-dir>/<job-id>_report.json]
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print the JSON report to stdout instead of the summary
        #[arg(long)]
        output_json: bool,
    },

    /// Show the processing plan for a source export
    Analyze {
        /// Directory holding one export file per legacy table
        #[arg(long)]
        source: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        output_json: bool,
    },

    /// Load and validate the configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            source,
            company,
            output_dir,
            workers,
            dry_run,
            direct,
            report: report_override,
            output_json,
        } => {
            // Apply overrides
            config.company = company;
            if let Some(dir) = output_dir {
                config.output.directory = dir;
            }
            if let Some(w) = workers {
                config.processing_options.workers = Some(w);
            }
            if dry_run {
                config.processing_options.dry_run = true;
            }
            if direct {
                config.output.direct = true;
            }
            let config = config.with_auto_tuning();
            let output_dir = config.output.directory.clone();

            let registry = Arc::new(TargetRegistry::new());
            let mut orchestrator = Orchestrator::new(config)?.with_registry(registry.clone());

            let printer = if cli.progress {
                let (tx, mut rx) = mpsc::channel(256);
                orchestrator = orchestrator.with_progress(tx);
                Some(tokio::spawn(async move {
                    while let Some(update) = rx.recv().await {
                        if let Ok(line) = serde_json::to_string(&update) {
                            eprintln!("{}", line);
                        }
                    }
                }))
            } else {
                None
            };

            let job = orchestrator.run(&source).await;
            drop(orchestrator);
            registry.close_all().await;
            if let Some(printer) = printer {
                let _ = printer.await;
            }
            let job = job?;

            let job_report = JobReport::from_job(&job);
            let report_file = report_override.unwrap_or_else(|| report::report_path(&output_dir, &job.id));
            job_report.write_json(&report_file)?;

            if output_json {
                println!("{}", job_report.to_json()?);
            } else {
                println!("\n{}", report::console_summary(&job));
                println!("Report: {}", report_file.display());
            }
            Ok(report::exit_status(&job))
        }

        Commands::Analyze {
            source,
            output_json,
        } => {
            let orchestrator = Orchestrator::new(config)?;
            let plan = orchestrator.analyze(&source).await?;

            if output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!(
                    "Processing plan for {} ({} tables, {} rows)\n",
                    source.display(),
                    plan.tables.len(),
                    plan.total_records()
                );
                print!("{}", plan.describe());
            }
            Ok(0)
        }

        Commands::CheckConfig => {
            config.validate()?;
            println!("Configuration is valid");
            println!("  Column mappings: {}", config.oil_gas_mappings.len());
            println!("  Table mappings:  {}", config.table_mappings.len());
            println!("  Business rules:  {}", config.validation_rules.business_rules.len());
            println!("  Hash:            {}", config.hash());
            Ok(0)
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
