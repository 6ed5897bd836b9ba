//! Vault registry indexer
//!
//! This binary provides:
//! - Event listening from registry contracts (releases, vaults, tags)
//! - Reconciliation into the registry/release/vault entity graph
//! - SQLite persistence with atomic checkpoints
//! - Offline replay of recorded event streams

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vaultreg_indexer::config::{Config, LoggingConfig};
use vaultreg_indexer::storage::Storage;

#[derive(Parser)]
#[command(name = "vaultreg-indexer")]
#[command(version, about = "Indexer for vault registry release and vault events", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexer service
    Run,

    /// Show indexer status and sync progress
    Status,

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://vaultreg.db")]
        database_url: String,
    },

    /// Reconcile a newline-delimited JSON file of delivered events in memory
    Replay {
        /// Input file, one delivered event per line
        input: PathBuf,
    },

    /// Print the persisted entity graph as JSON
    Dump,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = Config::from_file(&cli.config).context("Failed to load configuration")?;
            init_logging(cli.debug, Some(&config.logging))?;
            info!("Vault registry indexer starting...");
            info!("Version: {}", env!("CARGO_PKG_VERSION"));
            run_indexer(config).await?
        }
        Commands::Status => {
            init_logging(cli.debug, None)?;
            show_status(&cli.config).await?
        }
        Commands::InitDb { database_url } => {
            init_logging(cli.debug, None)?;
            init_database(&database_url).await?
        }
        Commands::Replay { input } => {
            init_logging(cli.debug, None)?;
            replay(&input)?
        }
        Commands::Dump => {
            init_logging(cli.debug, None)?;
            dump(&cli.config).await?
        }
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, logging: Option<&LoggingConfig>) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("vaultreg_indexer=debug,sqlx=debug")
    } else {
        let level = logging.map(|l| l.level.as_str()).unwrap_or("info");
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("vaultreg_indexer={}", level)))
    };

    let json = logging.is_some_and(|l| l.format == "json");

    // Logs go to stderr so JSON output of replay and dump stays clean.
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

/// Main indexer service
async fn run_indexer(config: Config) -> Result<()> {
    use vaultreg_indexer::listener::{RpcProvider, SyncEngine};

    info!("Configuration loaded successfully");
    info!("  Chain ID: {}", config.network.chain_id);
    info!("  RPC URL: {}", config.network.rpc_url);
    info!("  Database: {}", config.database.url);
    info!("  Start block: {}", config.sync.start_block);
    for source in &config.registries {
        info!("  Registry: {} ({:?})", source.address, source.kind);
    }

    let storage = connect(&config).await?;
    info!("Database initialized");

    let provider = RpcProvider::new(&config.network.rpc_url, &config.registries)
        .await
        .context("Failed to create RPC provider")?;

    let node_chain_id = provider.get_chain_id().await?;
    if node_chain_id != config.network.chain_id {
        bail!(
            "RPC node reports chain ID {} but configuration expects {}",
            node_chain_id,
            config.network.chain_id
        );
    }

    info!("RPC provider initialized");

    let sync_state = storage.get_sync_state().await?;
    if sync_state.chain_id == 0 {
        // The sync engine resumes at last_block + 1, so start one block early.
        let initial_block = config.sync.start_block.saturating_sub(1);
        info!(
            "Fresh database detected, initializing sync state with chain_id={} initial_block={} (will start syncing from block {})",
            config.network.chain_id, initial_block, config.sync.start_block
        );
        storage
            .initialize_sync_state(config.network.chain_id, initial_block)
            .await
            .context("Failed to initialize sync state")?;
    } else if sync_state.chain_id != config.network.chain_id {
        bail!(
            "Database was indexed for chain ID {} but configuration expects {}",
            sync_state.chain_id,
            config.network.chain_id
        );
    } else {
        info!(
            "Existing sync state found: chain_id={} last_block={}",
            sync_state.chain_id, sync_state.last_block_number
        );
    }

    let store = storage
        .load_store()
        .await
        .context("Failed to load entity graph")?;

    let sync_engine = SyncEngine::new(provider, storage.clone(), config.sync.clone(), store);
    let sync_handle = tokio::spawn(sync_engine.run());

    info!("Indexer is running. Press Ctrl+C to stop.");

    tokio::select! {
        result = sync_handle => {
            storage.close().await;
            match result {
                Ok(Ok(())) => {
                    warn!("Sync engine exited unexpectedly");
                    Ok(())
                }
                Ok(Err(e)) => Err(e).context("Sync engine failed"),
                Err(e) => Err(anyhow::anyhow!("Sync task panicked: {}", e)),
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            storage.close().await;
            Ok(())
        }
    }
}

/// Show indexer status
async fn show_status(config_path: &str) -> Result<()> {
    info!("Checking indexer status");

    let storage = match Config::from_file(config_path) {
        Ok(config) => {
            info!("Using database from config: {}", config.database.url);
            connect(&config).await?
        }
        Err(e) => {
            // Config::from_file wraps errors with context, so walk the chain.
            let is_not_found = e.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
            });

            if !is_not_found {
                return Err(e).context("Failed to load config file");
            }

            info!("Config file not found, using default database: sqlite://vaultreg.db");
            let storage = Storage::new("sqlite://vaultreg.db", None, None)
                .await
                .context("Failed to connect to database")?;
            storage
                .run_migrations()
                .await
                .context("Failed to run migrations")?;
            storage
        }
    };

    let sync_state = storage.get_sync_state().await?;
    let stats = storage.stats().await?;

    println!("\n=== Vault Registry Indexer Status ===\n");
    println!("Sync Progress:");
    println!("  Chain ID: {}", sync_state.chain_id);
    println!("  Last Block: {}", sync_state.last_block_number);
    println!(
        "  Last Updated: {}",
        chrono::DateTime::from_timestamp(sync_state.updated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );

    println!("\nEntity Graph:");
    println!("  Transactions: {}", stats.transaction_count);
    println!("  Registries: {}", stats.registry_count);
    println!("  Releases: {}", stats.release_count);
    println!("  Vaults: {}", stats.vault_count);
    println!("  Tagged Vaults: {}", stats.tagged_vault_count);
    println!();

    storage.close().await;

    Ok(())
}

/// Initialize database
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Registries: {}", stats.registry_count);
    info!("  Releases: {}", stats.release_count);
    info!("  Vaults: {}", stats.vault_count);
    info!("  Last block: {}", stats.last_block_number);

    storage.close().await;

    Ok(())
}

/// Reconcile recorded events without touching the chain or the database
fn replay(input: &Path) -> Result<()> {
    use vaultreg_indexer::{DeliveredEvent, MemoryStore, Reconciler};

    let file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open replay file: {}", input.display()))?;

    let mut reconciler = Reconciler::new(MemoryStore::new());

    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: DeliveredEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event on line {}", index + 1))?;
        reconciler.apply(&event);
    }

    let stats = reconciler.stats();
    info!(
        "Replayed {} events: {} releases, {} vaults, {} tags, {} duplicates, {} orphan tags",
        stats.events,
        stats.releases_created,
        stats.vaults_created,
        stats.tags_applied,
        stats.duplicates,
        stats.orphan_tags
    );

    let output = serde_json::json!({
        "stats": stats,
        "graph": reconciler.store().graph().dump(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// Print the persisted entity graph
async fn dump(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path).context("Failed to load configuration")?;
    let storage = connect(&config).await?;

    let store = storage.load_store().await?;
    println!("{}", serde_json::to_string_pretty(&store.graph().dump())?);

    storage.close().await;

    Ok(())
}
