//! MedRef server binary
//!
//! # Examples
//!
//! ```bash
//! # Start the HTTP API over the in-process store, persisted to a snapshot
//! medref serve --port 8080 --snapshot data/medref.json
//!
//! # Rebuild the search index of two namespaces
//! medref reindex drug inn
//!
//! # Ids changed since a Unix timestamp (negative cursor lists deletions)
//! medref changes drug --since 1700000000
//! ```

use clap::{Args, Parser, Subcommand};
use medref::catalog::RebuildRequest;
use medref::server::{start_server, AppState};
use medref::{AppConfig, Catalog, Kind, MemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// MedRef - medical reference catalog
#[derive(Parser, Debug)]
#[command(name = "medref")]
#[command(version = medref::VERSION)]
#[command(about = "MedRef - medical reference catalog over a key-value store", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = "medref.toml", env = "MEDREF_CONFIG")]
    config: PathBuf,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "MEDREF_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve(ServeArgs),

    /// Rebuild search indexes from stored records
    Reindex(ReindexArgs),

    /// Print the change feed of a namespace
    Changes(ChangesArgs),

    /// Show version
    Version,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// HTTP bind address (overrides server.http_addr)
    #[arg(short, long, env = "MEDREF_BIND")]
    bind: Option<String>,

    /// HTTP port (overrides server.http_port)
    #[arg(short, long, env = "MEDREF_PORT")]
    port: Option<u16>,

    /// Snapshot file for the memory backend (overrides store.snapshot)
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReindexArgs {
    /// Namespaces to rebuild (all when omitted)
    namespaces: Vec<Kind>,

    /// Records loaded per round trip
    #[arg(long, default_value = "256")]
    batch_size: usize,

    /// Snapshot file for the memory backend (overrides store.snapshot)
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ChangesArgs {
    /// Namespace
    namespace: Kind,

    /// Cursor: changes at or after it, or deletions up to it when negative
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    since: i64,

    /// Snapshot file for the memory backend (overrides store.snapshot)
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    match cli.command {
        Commands::Serve(args) => serve_command(&cli.config, args).await,
        Commands::Reindex(args) => reindex_command(&cli.config, args).await,
        Commands::Changes(args) => changes_command(&cli.config, args).await,
        Commands::Version => {
            println!("MedRef {}", medref::VERSION);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "medref.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(!cli.no_color),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

fn load_config(path: &Path, snapshot: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(Some(path))?;
    if snapshot.is_some() {
        config.store.snapshot = snapshot;
    }
    Ok(config)
}

/// Open the store and the catalog over it
fn open_catalog(config: &AppConfig) -> anyhow::Result<(Catalog, Option<MemoryStore>)> {
    medref::metrics::init_metrics();
    let (storage, memory) = medref::storage::open(&config.store)?;
    let catalog = Catalog::new(storage, config)?;
    Ok((catalog, memory))
}

fn save_snapshot(config: &AppConfig, memory: Option<&MemoryStore>) -> anyhow::Result<()> {
    if let (Some(memory), Some(path)) = (memory, config.store.snapshot.as_ref()) {
        memory.save_snapshot(path)?;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}

/// Serve command - start the HTTP API
async fn serve_command(config_path: &Path, args: ServeArgs) -> anyhow::Result<()> {
    info!(version = %medref::VERSION, "MedRef starting");

    let mut config = load_config(config_path, args.snapshot)?;
    if let Some(bind) = args.bind {
        config.server.http_addr = bind;
    }
    if let Some(port) = args.port {
        config.server.http_port = port;
    }

    let (catalog, memory) = open_catalog(&config)?;
    if memory.is_some() && config.store.snapshot.is_none() {
        warn!("Memory backend without a snapshot file: data is lost on exit");
    }

    let state = Arc::new(AppState::new(catalog, config.clone()));
    let served = start_server(state, shutdown_signal()).await;

    save_snapshot(&config, memory.as_ref())?;
    served
}

/// Reindex command - rebuild search indexes
async fn reindex_command(config_path: &Path, args: ReindexArgs) -> anyhow::Result<()> {
    let config = load_config(config_path, args.snapshot)?;
    let (catalog, memory) = open_catalog(&config)?;

    let request = if args.namespaces.is_empty() {
        RebuildRequest::all()
    } else {
        RebuildRequest::for_kinds(args.namespaces)
    }
    .with_batch_size(args.batch_size.max(1));

    let report = catalog.rebuild(&request).await?;
    for namespace in &report.namespaces {
        println!(
            "{:<10} indexed {:>7}  missing {:>5}",
            namespace.namespace, namespace.indexed, namespace.missing
        );
    }
    println!("job {} finished in {} ms", report.job_id, report.elapsed_ms);

    save_snapshot(&config, memory.as_ref())
}

/// Changes command - print the change feed
async fn changes_command(config_path: &Path, args: ChangesArgs) -> anyhow::Result<()> {
    let config = load_config(config_path, args.snapshot)?;
    let (catalog, _memory) = open_catalog(&config)?;

    for change in catalog.change_log(args.namespace, args.since).await? {
        let marker = if change.deleted { "deleted" } else { "changed" };
        println!("{}\t{}\t{}", change.id, change.at, marker);
    }
    Ok(())
}
