//! tabledump CLI - bulk export and import of relational tables as JSON lines.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tabledump::{
    Catalog, Config, DumpError, ExportOptions, Exporter, Importer, PostgresStore, Store,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "tabledump")]
#[command(about = "Schema-driven bulk export and import of relational tables as JSON lines")]
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
    /// Export every table to JSON lines files
    Export {
        /// Output directory (or archive path with --compress)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a single .tar.gz archive instead of a directory
        #[arg(short = 'z', long)]
        compress: bool,

        /// Comma-separated list of tables to export (exact names)
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },

    /// Import JSON lines files into the tables named by their file names
    Import {
        /// Files to import, one table per file (<table>.json)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Number of rows applied per transaction
        #[arg(long)]
        buffer_capacity: Option<usize>,
    },

    /// Print the record layout derived from the schema
    Schema,

    /// Test the store connection
    HealthCheck,
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

async fn run() -> Result<(), DumpError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(DumpError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Export {
            output,
            compress,
            tables,
        } => {
            if let Some(output) = output {
                config.export.output = output;
            }
            if compress {
                config.export.compress = true;
            }
            if let Some(tables) = tables {
                config.export.tables = tables
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }

            let store = Arc::new(PostgresStore::connect(&config.store).await?);
            let exporter = Exporter::new(
                store.clone(),
                ExportOptions {
                    output: config.export.output.clone(),
                    compress: config.export.compress,
                    tables: config.export.tables.clone(),
                },
            );
            let result = exporter.run().await;
            store.close();
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nExport {}!", result.status.replace('_', " "));
                println!("  Output: {}", result.output);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}/{}", result.tables_success, result.tables_total);
                println!("  Rows: {}", result.rows_written);
                if result.rows_skipped > 0 {
                    println!("  Rows skipped: {}", result.rows_skipped);
                }
                if !result.failed_tables.is_empty() {
                    println!("  Failed tables: {:?}", result.failed_tables);
                }
            }
        }

        Commands::Import {
            files,
            buffer_capacity,
        } => {
            if let Some(capacity) = buffer_capacity {
                config.import.buffer_capacity = capacity;
                config.validate()?;
            }

            let store = Arc::new(PostgresStore::connect(&config.store).await?);
            let importer = Importer::new(store.clone(), config.import.buffer_capacity);
            let result = importer.run(&files).await;
            store.close();
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nImport {}!", result.status.replace('_', " "));
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Files: {}/{}", result.files_imported, result.files_total);
                println!("  Rows applied: {}", result.rows_applied);
                println!("  Transactions: {}", result.flushes);
                if result.lines_skipped > 0 {
                    println!("  Lines skipped: {}", result.lines_skipped);
                }
                if result.files_skipped > 0 {
                    println!("  Files skipped: {}", result.files_skipped);
                }
                if !result.failed_files.is_empty() {
                    println!("  Failed files: {:?}", result.failed_files);
                }
            }

            if result.rows_dropped > 0 {
                return Err(DumpError::MutationApply {
                    pending: result.rows_dropped,
                    unplaced: 0,
                    message: "writes still pending at the end of the run were dropped".into(),
                });
            }
        }

        Commands::Schema => {
            let store = PostgresStore::connect(&config.store).await?;
            let catalog = Catalog::load(&store).await;
            store.close();
            let catalog = catalog?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(catalog.tables())?);
            } else {
                for table in catalog.tables() {
                    if table.primary_key.is_empty() {
                        println!("{}", table.name);
                    } else {
                        println!("{} (primary key: {})", table.name, table.primary_key.join(", "));
                    }
                    for field in table.descriptor.fields() {
                        println!("  {:<32} {}", field.name, field.repr);
                    }
                }
            }
        }

        Commands::HealthCheck => {
            let start = Instant::now();
            let store = PostgresStore::connect(&config.store).await?;
            store.test_connection().await?;
            let latency_ms = start.elapsed().as_millis() as u64;
            store.close();

            if cli.output_json {
                let result = serde_json::json!({
                    "store": store.store_type(),
                    "connected": true,
                    "latency_ms": latency_ms,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Store ({}): OK ({}ms)",
                    store.store_type(),
                    latency_ms
                );
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("invalid verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("invalid log format '{}'", other)),
    }

    Ok(())
}
