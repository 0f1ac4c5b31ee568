use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use udnews::config::{Config, StoreBackend};
use udnews::feed;
use udnews::ingest::{Coordinator, Scheduler};
use udnews::storage::{MemoryStore, SourceSeed, SqliteStore, Store};

/// Get the default config file path (~/.config/udnews/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("udnews")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "udnews", about = "News feed aggregator daemon")]
struct Args {
    /// Config file path (default: ~/.config/udnews/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Run a single ingestion pass, print the report as JSON, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)?;

    if let Some(db) = args.db {
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = db.to_string_lossy().into_owned();
    }

    let store: Arc<dyn Store> = match config.store.backend {
        StoreBackend::Memory => {
            info!("using in-memory store, articles will not persist across restarts");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.store.path)
                .await
                .with_context(|| format!("failed to open database at {}", config.store.path))?;
            info!(path = %config.store.path, "opened SQLite store");
            Arc::new(store)
        }
    };

    let seeds: Vec<SourceSeed> = config
        .sources
        .iter()
        .map(|s| SourceSeed {
            name: s.name.clone(),
            url: s.url.clone(),
            active: s.active,
        })
        .collect();
    store
        .sync_sources(&seeds)
        .await
        .context("failed to sync configured sources into the store")?;

    let client = feed::client().context("failed to build HTTP client")?;
    let coordinator = Coordinator::new(
        store,
        client,
        Duration::from_secs(config.ingest.fetch_timeout_seconds),
    );
    let scheduler = Scheduler::new(Arc::new(coordinator));

    if args.once {
        let Some(result) = scheduler.trigger().await else {
            bail!("an ingestion run is already in flight");
        };
        let report = result.context("ingestion run failed")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let handle = scheduler.spawn(
        Duration::from_secs(config.ingest.startup_delay_seconds),
        Duration::from_secs(config.ingest.refresh_interval_minutes * 60),
    );
    info!(
        startup_delay_s = config.ingest.startup_delay_seconds,
        interval_min = config.ingest.refresh_interval_minutes,
        "scheduler started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    handle.abort();

    Ok(())
}
