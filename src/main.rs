mod address;
mod config;
mod engine;
mod entities;
mod error;
mod events;
mod http;
mod indexer;
mod retry;
mod rpc;
mod state;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use crate::config::IndexerSettings;
use crate::engine::EventEngine;
use crate::indexer::ChainIndexer;
use crate::rpc::RpcLogSource;
use crate::state::{AppState, IndexerProgress};
use anyhow::{Context, Result};
use axum::Router;
use migration::MigratorTrait;
use sea_orm::ConnectOptions;
use sea_orm::Database;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = IndexerSettings::load().context("Failed to load configuration")?;
    let registry = config
        .index_log
        .registry()
        .context("Invalid contract configuration")?;
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let source = RpcLogSource::new(&config.endpoint.rpcs, config.indexer.request_timeout())
        .context("Failed to initialize RPC log source")?;
    let chain_id = source
        .chain_id()
        .await
        .context("Failed to query chain id")?;
    anyhow::ensure!(
        chain_id == config.endpoint.id,
        "RPC endpoints serve chain {chain_id}, configuration expects {}",
        config.endpoint.id
    );
    if let Some(gateway) = &config.gateway {
        info!(%gateway, "Downstream gateway configured");
    }
    for contract in registry.contracts() {
        info!(
            name = %contract.name,
            address = %contract.address,
            standard = contract.standard.as_str(),
            "Indexing contract"
        );
    }

    let progress = Arc::new(IndexerProgress::default());
    let app_state = AppState::new(database.clone(), Arc::clone(&progress));

    let indexer = ChainIndexer::new(
        database.clone(),
        source,
        EventEngine::new(registry),
        config.indexer.clone(),
        config.index_log.start_block,
        Arc::clone(&progress),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let indexer_handle = tokio::spawn(async move {
        if let Err(err) = indexer.run(shutdown_rx).await {
            error!("Indexer terminated with error: {err}");
        }
    });

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Governance indexer health endpoints listening on {local_addr}");

    let router: Router = http::router(app_state);
    let server = axum::serve(listener, router.into_make_service());
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("HTTP server exited with error")?;

    shutdown_tx.send(true).ok();
    if let Err(join_err) = indexer_handle.await {
        error!("Indexer task join error: {join_err}");
    }

    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn connect_database(config: &IndexerSettings) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    assert!(
        config.database.max_connections <= 128,
        "Connection pool oversized"
    );

    Database::connect(options)
        .await
        .context("Failed to connect to database")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
