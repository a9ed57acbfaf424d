//! access-pg-migrate CLI - MS Access to PostgreSQL migration.

use access_pg_migrate::error::EXIT_TRANSFER_ERROR;
use access_pg_migrate::state::StateStore;
use access_pg_migrate::{
    health_check, inspect, source, Config, MappingCatalog, MigrateError, MigrationResult,
    MigrationVerifier, Orchestrator, PgPool, TargetPool,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "access-pg-migrate")]
#[command(about = "Resumable MS Access to PostgreSQL migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to state file for resume capability
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate all configured tables in dependency order
    Run {
        /// Transform and validate every record without writing
        #[arg(long)]
        dry_run: bool,

        /// Reset state and migrate completed tables again
        #[arg(long)]
        force: bool,
    },

    /// Validate migrated data against the source
    Validate {
        /// Report path [default: validation.report_file from config]
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Inspect the Access schema and write reports
    Inspect {
        /// Directory for access-schema.json and schema-summary.txt
        #[arg(long, default_value = "reports")]
        output_dir: PathBuf,
    },

    /// Show migration progress from the state file
    Status,

    /// Reset migration state
    Reset {
        /// Destination table to return to pending
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        table: Option<String>,

        /// Forget the state of every table
        #[arg(long)]
        all: bool,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    if let Some(ref path) = cli.state_file {
        config.migration.state_file = path.to_string_lossy().into_owned();
    }

    match cli.command {
        Commands::Run { dry_run, force } => {
            config.migration.dry_run |= dry_run;
            config.migration.force |= force;

            let mut orchestrator = Orchestrator::connect(config).await?;
            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_run_summary(&result);
            }

            if !result.is_success() {
                return Ok(ExitCode::from(EXIT_TRANSFER_ERROR));
            }
        }

        Commands::Validate { output } => {
            let report_path =
                output.unwrap_or_else(|| PathBuf::from(&config.validation.report_file));
            let catalog = MappingCatalog::standard();
            let selection = catalog.resolve_tables(&config.migration.tables);

            let source = source::connect(&config.source).await?;
            let target = PgPool::new(&config.target).await?;
            let report = MigrationVerifier::new(source.as_ref(), &target, &catalog)
                .with_sample_size(config.validation.sample_records)
                .verify(&selection.tables)
                .await;
            source.close().await;
            target.close().await;
            report.save_report(&report_path)?;

            let s = &report.summary;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Validation Results:");
                println!("  Tables: {}/{} valid", s.valid_tables, s.total_tables);
                println!("  Source records: {}", s.total_source_records);
                println!("  Destination records: {}", s.total_dest_records);
                println!("  Errors: {}", s.total_errors);
                println!("  Warnings: {}", s.total_warnings);
                for (name, table) in &report.tables {
                    for err in &table.errors {
                        println!("    [{}] {}", name, err);
                    }
                }
                println!("  Report: {}", report_path.display());
                println!(
                    "\n  Overall: {}",
                    if s.all_valid { "VALID" } else { "INVALID" }
                );
            }

            if !s.all_valid {
                return Ok(ExitCode::from(1));
            }
        }

        Commands::Inspect { output_dir } => {
            let source = source::connect(&config.source).await?;
            let inspected = inspect::inspect_database(source.as_ref(), &output_dir).await;
            source.close().await;
            let output = inspected?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&output.inspection)?);
            } else {
                println!(
                    "Inspected {} table(s)",
                    output.inspection.tables.len()
                );
                println!("  Schema: {}", output.schema_file.display());
                println!("  Summary: {}", output.summary_file.display());
            }
        }

        Commands::Status => {
            let store = StateStore::open(&config.migration.state_file);
            let summary = store.summary();

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Migration Status ({}):", store.path().display());
                println!("  Tables tracked: {}", summary.total_tables);
                println!("  Completed: {}", summary.completed);
                println!("  In progress: {}", summary.in_progress);
                println!("  Failed: {}", summary.failed);
                println!("  Pending: {}", summary.pending);
                println!("  Records migrated: {}", summary.records_migrated);
                for (name, table) in &summary.tables {
                    print!(
                        "    {:<24} {:<12} {:>8}",
                        name,
                        table.status.as_str(),
                        table.records_migrated
                    );
                    match table.error {
                        Some(ref err) => println!("  {}", err),
                        None => println!(),
                    }
                }
            }
        }

        Commands::Reset { table, all } => {
            let mut store = StateStore::open(&config.migration.state_file);
            match table {
                Some(table) if !all => {
                    store.reset(&table)?;
                    println!("Reset state for {}", table);
                }
                _ => {
                    store.reset_all()?;
                    println!("Reset state for all tables");
                }
            }
        }

        Commands::HealthCheck => {
            let result = health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (Access{}): {} ({}ms)",
                    result
                        .source_backend
                        .as_deref()
                        .map(|b| format!(", {}", b))
                        .unwrap_or_default(),
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "Health check failed",
                    "health-check",
                ));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_run_summary(result: &MigrationResult) {
    let status_msg = if result.dry_run {
        "Dry run completed!"
    } else if result.is_success() {
        "Migration completed!"
    } else {
        "Migration finished with failures"
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Tables: {} completed, {} skipped, {} failed (of {})",
        result.tables_completed, result.tables_skipped, result.tables_failed, result.tables_total
    );
    println!("  Records: {}", result.records_migrated);
    if !result.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", result.failed_tables);
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
