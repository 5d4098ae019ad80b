//! rowferry CLI - table migration, reports and ledger housekeeping.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rowferry::ledger::LedgerStore;
use rowferry::store::build_pool;
use rowferry::{
    Config, FerryError, IdempotencyLedger, MigrationJob, Migrator, PgLedger, PgStore,
    ReportEngine, RetentionSweeper, SftpTransfer,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "rowferry")]
#[command(about = "Table migration between PostgreSQL stores over SFTP")]
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
    /// Export a source table to CSV and upload it to the remote directory
    Export {
        /// Table to export
        table: String,

        /// Local file the CSV is written to
        #[arg(long, default_value = "export.csv")]
        local: PathBuf,
    },

    /// Download a remote CSV and bulk-load it into a destination table
    Import {
        /// File name beneath the configured remote directory
        remote_file: String,

        /// Destination table
        table: String,

        /// Local file the download lands in
        #[arg(long, default_value = "import.csv")]
        local: PathBuf,
    },

    /// Run a full export + import, then report duplicate names on the
    /// destination
    MigrateReport {
        /// Source table
        table: String,

        /// Destination table (defaults to the source table name)
        #[arg(long)]
        destination: Option<String>,

        /// Local scratch file the CSV passes through
        #[arg(long, default_value = "migrate.csv")]
        local: PathBuf,
    },

    /// Download a remote CSV (no import) and report duplicate names from it
    CsvReport {
        /// File name beneath the configured remote directory
        remote_file: String,

        /// Local file the download lands in
        #[arg(long, default_value = "report.csv")]
        local: PathBuf,
    },

    /// Aggregate reports against the destination store
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },

    /// Purge expired idempotency ledger records
    Sweep {
        /// Keep sweeping on the configured interval until interrupted
        #[arg(long)]
        daemon: bool,
    },

    /// Create the idempotency ledger schema
    InitLedger,
}

#[derive(Subcommand)]
enum ReportKind {
    /// Distinct names from the calendar month of the newest entity
    LatestCohort,

    /// Names held by more than one entity
    Duplicates,

    /// Count of entities with a matching secondary entity
    Matched,

    /// Count of secondary entities nothing references
    Unreferenced,
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

async fn run() -> Result<(), FerryError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(FerryError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel = setup_signal_handler();

    match cli.command {
        Commands::Export { table, local } => {
            let migrator = build_migrator(&config).await?;
            let summary = migrator.export_and_transfer(&table, &local, &cancel).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Export completed!");
                println!("  Run ID: {}", summary.run_id);
                println!("  Rows: {}", summary.rows);
                println!("  Remote path: {}", summary.remote_path);
                println!("  Duration: {:.2}s", summary.duration_seconds);
            }
        }

        Commands::Import {
            remote_file,
            table,
            local,
        } => {
            let migrator = build_migrator(&config).await?;
            let summary = migrator
                .download_and_import(&remote_file, &local, &table, &cancel)
                .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Import completed!");
                println!("  Run ID: {}", summary.run_id);
                println!("  Rows: {}", summary.rows);
                println!("  Table: {}", summary.table);
                println!("  Duration: {:.2}s", summary.duration_seconds);
            }
        }

        Commands::MigrateReport {
            table,
            destination,
            local,
        } => {
            let engine = build_engine(&config).await?;
            let remote_file = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "migrate.csv".to_string());
            let job = MigrationJob {
                source_table: table.clone(),
                local_path: local,
                remote_file,
                destination_table: destination.unwrap_or(table),
            };

            let report = engine.migrate_then_duplicates(&job, &cancel).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Migration completed!");
                println!("  Exported rows: {}", report.migration.export.rows);
                println!("  Imported rows: {}", report.migration.import.rows);
                println!("  Duplicate names: {:?}", report.duplicates);
            }
        }

        Commands::CsvReport { remote_file, local } => {
            let engine = build_engine(&config).await?;
            let duplicates = engine.csv_duplicate_names(&remote_file, &local).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&duplicates)?);
            } else {
                println!("Duplicate names: {:?}", duplicates);
            }
        }

        Commands::Report { kind } => {
            let engine = build_engine(&config).await?;

            match kind {
                ReportKind::LatestCohort => {
                    let names = engine.latest_cohort_names().await?;
                    print_names(cli.output_json, &names)?;
                }
                ReportKind::Duplicates => {
                    let names = engine.duplicate_names().await?;
                    print_names(cli.output_json, &names)?;
                }
                ReportKind::Matched => {
                    let count = engine.count_matched_entities().await?;
                    println!("{}", count);
                }
                ReportKind::Unreferenced => {
                    let count = engine.count_unreferenced_secondaries().await?;
                    println!("{}", count);
                }
            }
        }

        Commands::Sweep { daemon } => {
            let ledger_store = Arc::new(PgLedger::new(build_pool(&config.destination)?));
            let sweeper = RetentionSweeper::new(ledger_store, &config.ledger);

            if daemon {
                let shutdown = CancellationToken::new();
                let token = shutdown.clone();
                let mut cancel = cancel;
                tokio::spawn(async move {
                    // Translate the cancellation signal into sweeper shutdown.
                    let _ = cancel.wait_for(|c| *c).await;
                    token.cancel();
                });
                info!(
                    "Sweeping every {}s until interrupted",
                    config.ledger.sweep_interval_secs
                );
                sweeper
                    .spawn(shutdown)
                    .await
                    .map_err(|e| FerryError::Config(format!("sweeper task failed: {}", e)))?;
            } else {
                let purged = sweeper.sweep_once().await?;
                println!("Purged {} expired ledger records", purged);
            }
        }

        Commands::InitLedger => {
            let ledger_store = Arc::new(PgLedger::new(build_pool(&config.destination)?));
            ledger_store.init_schema().await?;
            // Exercise the facade wiring so a broken schema fails here, not
            // on the first production lookup.
            let ledger = IdempotencyLedger::new(ledger_store);
            ledger.lookup("healthcheck", "InitLedger").await?;
            println!("Ledger schema ready");
        }
    }

    Ok(())
}

async fn build_migrator(config: &Config) -> Result<Migrator, FerryError> {
    let source = Arc::new(PgStore::connect(&config.source, config.report.clone()).await?);
    let dest = Arc::new(PgStore::connect(&config.destination, config.report.clone()).await?);
    let transfer = Arc::new(SftpTransfer::new(config.sftp.clone()));

    Ok(Migrator::new(
        source,
        dest,
        transfer,
        config.sftp.remote_dir.clone(),
        config.migration.batch_size,
    ))
}

async fn build_engine(config: &Config) -> Result<ReportEngine, FerryError> {
    let dest = Arc::new(PgStore::connect(&config.destination, config.report.clone()).await?);
    let migrator = Arc::new(build_migrator(config).await?);
    let transfer = Arc::new(SftpTransfer::new(config.sftp.clone()));

    Ok(ReportEngine::new(
        dest,
        migrator,
        transfer,
        config.sftp.remote_dir.clone(),
        config.report.name_column.clone(),
    ))
}

fn print_names(output_json: bool, names: &[String]) -> Result<(), FerryError> {
    if output_json {
        println!("{}", serde_json::to_string_pretty(names)?);
    } else {
        for name in names {
            println!("{}", name);
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
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handling for graceful cancellation.
///
/// Returns a watch receiver that flips to true when SIGINT or SIGTERM
/// arrives; migrations observe it at row-batch granularity.
#[cfg(unix)]
fn setup_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Cancelling..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Cancelling..."),
        }
        let _ = tx.send(true);
    });

    rx
}

#[cfg(not(unix))]
fn setup_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Cancelling...");
            let _ = tx.send(true);
        }
    });

    rx
}
