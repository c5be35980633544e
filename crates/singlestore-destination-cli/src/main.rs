//! singlestore-destination CLI - apply schema changes and CDC batches to SingleStore.

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use singlestore_destination::orchestrator::{
    AlterTableRequest, CreateTableRequest, MigrateRequest, TableRef, TruncateRequest,
    WriteBatchRequest,
};
use singlestore_destination::core::LogWarnings;
use singlestore_destination::{ApplyError, Config, Orchestrator, SingleStoreConnection};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "singlestore-destination")]
#[command(about = "Apply schema changes and CDC batches to SingleStore")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

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
    /// Test the database connection
    Test,

    /// Describe a live table
    Describe {
        /// Request file (YAML or JSON) naming the database and table
        #[arg(long)]
        request: PathBuf,
    },

    /// Create a table (and its database when missing)
    CreateTable {
        /// Request file (YAML or JSON) with the database and table shape
        #[arg(long)]
        request: PathBuf,
    },

    /// Alter a live table to a new shape
    AlterTable {
        /// Request file (YAML or JSON) with the database and table shape
        #[arg(long)]
        request: PathBuf,
    },

    /// Delete or soft-delete rows synced before a cutoff
    Truncate {
        /// Request file (YAML or JSON) with the table and cutoff
        #[arg(long)]
        request: PathBuf,
    },

    /// Run a schema migration
    Migrate {
        /// Request file (YAML or JSON) with the table and migration
        #[arg(long)]
        request: PathBuf,
    },

    /// Apply batch files to a table
    WriteBatch {
        /// Request file (YAML or JSON) listing the batch files
        #[arg(long)]
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), ApplyError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match &cli.command {
        Commands::Test => {
            let mut orchestrator = connect(&config).await?;
            orchestrator.test_connection().await?;
            report(cli.output_json, &serde_json::json!({ "ok": true }), || {
                println!("Connection OK");
            })?;
            orchestrator.into_connection().close().await?;
        }

        Commands::Describe { request } => {
            let request: TableRef = load_request(request)?;
            let mut orchestrator = connect(&config).await?;
            let table = orchestrator.describe_table(&request).await?;
            report(cli.output_json, &table, || match &table {
                Some(table) => {
                    println!("{}.{}:", request.database, table.name);
                    for col in &table.columns {
                        println!(
                            "  {} {:?}{}",
                            col.name,
                            col.data_type,
                            if col.primary_key { " (primary key)" } else { "" }
                        );
                    }
                }
                None => println!("{}.{} does not exist", request.database, request.table),
            })?;
            orchestrator.into_connection().close().await?;
        }

        Commands::CreateTable { request } => {
            let request: CreateTableRequest = load_request(request)?;
            let mut orchestrator = connect(&config).await?;
            orchestrator.create_table(&request, &mut LogWarnings).await?;
            report(cli.output_json, &serde_json::json!({ "ok": true }), || {
                println!("Created {}.{}", request.database, request.table.name);
            })?;
            orchestrator.into_connection().close().await?;
        }

        Commands::AlterTable { request } => {
            let request: AlterTableRequest = load_request(request)?;
            let mut orchestrator = connect(&config).await?;
            let changed = orchestrator.alter_table(&request, &mut LogWarnings).await?;
            report(
                cli.output_json,
                &serde_json::json!({ "changed": changed }),
                || {
                    if changed {
                        println!("Altered {}.{}", request.database, request.table.name);
                    } else {
                        println!("{}.{} already up to date", request.database, request.table.name);
                    }
                },
            )?;
            orchestrator.into_connection().close().await?;
        }

        Commands::Truncate { request } => {
            let request: TruncateRequest = load_request(request)?;
            let mut orchestrator = connect(&config).await?;
            orchestrator.truncate(&request, &mut LogWarnings).await?;
            report(cli.output_json, &serde_json::json!({ "ok": true }), || {
                println!("Truncated {}.{}", request.database, request.table);
            })?;
            orchestrator.into_connection().close().await?;
        }

        Commands::Migrate { request } => {
            let request: MigrateRequest = load_request(request)?;
            let mut orchestrator = connect(&config).await?;
            orchestrator.migrate(&request, &mut LogWarnings).await?;
            report(cli.output_json, &serde_json::json!({ "ok": true }), || {
                println!(
                    "Applied {} to {}.{}",
                    request.migration.name(),
                    request.database,
                    request.table
                );
            })?;
            orchestrator.into_connection().close().await?;
        }

        Commands::WriteBatch { request } => {
            let request: WriteBatchRequest = load_request(request)?;
            let mut orchestrator = connect(&config).await?;
            let outcome = orchestrator.write_batch(&request).await?;
            report(cli.output_json, &outcome, || {
                println!("Batch applied!");
                println!("  Files: {}", outcome.files);
                println!("  Rows affected: {}", outcome.rows_affected);
            })?;
            orchestrator.into_connection().close().await?;
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<Orchestrator<SingleStoreConnection>, ApplyError> {
    let conn = SingleStoreConnection::connect(&config.target).await?;
    Ok(Orchestrator::new(conn).with_batch_size(config.apply.batch_size))
}

/// Read a request file; `.json` files are parsed as JSON, anything else as YAML.
fn load_request<T: DeserializeOwned>(path: &Path) -> Result<T, ApplyError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_yaml::from_str(&content)?)
    }
}

fn report<T: Serialize>(
    output_json: bool,
    value: &T,
    text: impl FnOnce(),
) -> Result<(), ApplyError> {
    if output_json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text();
    }
    Ok(())
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
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
