//! sqlite-pg-migrate CLI - One-shot SQLite to PostgreSQL data migration.

use clap::{Parser, Subcommand};
use sqlite_pg_migrate::{Config, MigrateError, MigrationPlan, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sqlite-pg-migrate")]
#[command(about = "One-shot SQLite to PostgreSQL data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (ignored when --sqlite is given)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to a YAML migration plan (defaults to the built-in plan)
    #[arg(long)]
    plan: Option<PathBuf>,

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
    /// Migrate all tables from the SQLite file into PostgreSQL
    Run {
        /// SQLite database file (bypasses the config file)
        #[arg(long)]
        sqlite: Option<PathBuf>,

        /// PostgreSQL connection URL (or set DATABASE_URL)
        #[arg(long)]
        pg: Option<String>,

        /// Show the plan without connecting or transferring data
        #[arg(long)]
        dry_run: bool,
    },

    /// Compare row counts between source and target
    Validate {
        /// SQLite database file (bypasses the config file)
        #[arg(long)]
        sqlite: Option<PathBuf>,

        /// PostgreSQL connection URL (or set DATABASE_URL)
        #[arg(long)]
        pg: Option<String>,
    },
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

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(MigrateError::Config)?;

    let plan = match cli.plan {
        Some(ref path) => {
            let plan = MigrationPlan::load(path)?;
            info!("Loaded migration plan from {:?}", path);
            plan
        }
        None => MigrationPlan::builtin(),
    };

    match cli.command {
        Commands::Run {
            sqlite,
            pg,
            dry_run,
        } => {
            if dry_run {
                println!("Would migrate {} tables in order:", plan.table_order.len());
                for table in &plan.table_order {
                    println!("  {}", table);
                }
                return Ok(ExitCode::SUCCESS);
            }

            let config = load_config(&cli.config, sqlite, pg)?;
            let mut orchestrator = Orchestrator::connect(&config, plan).await?;
            let report = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print!("{}", report.stats.render_summary());
            }

            if report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Validate { sqlite, pg } => {
            let config = load_config(&cli.config, sqlite, pg)?;
            let mut orchestrator = Orchestrator::connect(&config, plan).await?;
            let checks = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                let show = |count: Option<i64>| count.map_or("missing".to_string(), |n| n.to_string());
                for check in &checks {
                    let marker = if check.matches { "ok" } else { "MISMATCH" };
                    println!(
                        "  {:30} source={:<10} target={:<10} {}",
                        check.table,
                        show(check.source_rows),
                        show(check.target_rows),
                        marker
                    );
                }
            }

            if checks.iter().all(|c| c.matches) {
                println!("Validation completed successfully");
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Direct --sqlite/--pg flags take precedence over the config file.
fn load_config(
    config_path: &PathBuf,
    sqlite: Option<PathBuf>,
    pg: Option<String>,
) -> Result<Config, MigrateError> {
    match sqlite {
        Some(path) => Config::from_parts(path, pg),
        None => {
            let config = Config::load(config_path)?;
            info!("Loaded configuration from {:?}", config_path);
            Ok(config)
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
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
