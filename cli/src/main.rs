//! poolscand — the event-mirror daemon.
//!
//! Wires the pieces together: SQLite mirror, failover RPC connection
//! manager, range scanner, and the read-only HTTP API. The scanner runs
//! as a background task; a fatal scanner error takes the process down
//! with status 1 so the supervisor restarts it from the checkpoint.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use poolscan_api::{ApiState, serve};
use poolscan_core::{
    CheckpointStore, EventRegistry, RangeScanner, RecordStore, ScannerConfig, ScannerMetrics,
    TokioClock,
};
use poolscan_rpc::{ConnectionManager, EndpointPool};
use poolscan_storage::sqlite::SqliteStorage;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        endpoints = config.rpc_urls.len(),
        games = config.game_contracts.len(),
        start_block = config.start_block,
        "starting poolscand"
    );

    let storage = Arc::new(
        SqliteStorage::open(&config.database_url)
            .await
            .with_context(|| format!("failed to open database {}", config.database_url))?,
    );
    storage.seed_if_absent(config.start_block).await?;

    let metrics = Arc::new(ScannerMetrics::new());

    let mut registry = EventRegistry::builder(config.scale_factor)
        .pool_contract(&config.pool_contract)
        .referral_contract(&config.referral_contract);
    for (kind, address) in &config.game_contracts {
        registry = registry.game_contract(*kind, address);
    }

    let pool = EndpointPool::new(config.rpc_urls.clone())
        .context("no RPC endpoints configured")?;
    let manager = ConnectionManager::new(pool, Arc::clone(&metrics));

    let mut scanner = RangeScanner::new(
        ScannerConfig {
            range_width: config.scan_width,
            confirmation_delay: config.confirmation_delay,
            decode_failure_policy: config.decode_failure_policy,
            ..ScannerConfig::default()
        },
        Box::new(manager),
        registry.build(),
        Arc::clone(&storage) as Arc<dyn RecordStore>,
        Arc::clone(&storage) as Arc<dyn CheckpointStore>,
        Arc::clone(&metrics),
        Box::new(TokioClock),
    );

    tokio::spawn(async move {
        if let Err(e) = scanner.run().await {
            error!(error = %e, "scanner failed");
            std::process::exit(1);
        }
    });

    serve(
        ApiState {
            reader: storage,
            metrics,
        },
        config.http_port,
    )
    .await?;

    Ok(())
}
