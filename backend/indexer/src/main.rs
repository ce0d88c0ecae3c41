//! Gig Escrow Indexer: entry point.
//!
//! Starts a background indexer task that polls the JSON-RPC log feed for
//! escrow contract logs and projects them into SQLite.  Simultaneously
//! exposes a small Axum REST API for frontend / admin consumption.

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gig_indexer::api::{self, ApiState};
use gig_indexer::config::Config;
use gig_indexer::db;
use gig_indexer::indexer::{self, IndexerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared between the indexer and (future) outbound calls.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let shutdown = CancellationToken::new();

    // ─── Background indexer ───────────────────────────────
    let indexer_state = Arc::new(IndexerState {
        pool: pool.clone(),
        config: config.clone(),
        client,
    });
    let indexer_shutdown = shutdown.clone();
    let indexer_task = tokio::spawn(async move {
        let outcome = indexer::run(indexer_state, indexer_shutdown.clone()).await;
        // A fatal indexer error takes the API down with it.
        indexer_shutdown.cancel();
        outcome
    });

    // ─── REST API ─────────────────────────────────────────
    let app = api::build_router(Arc::new(ApiState { pool: pool.clone() }));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let api_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                _ = api_shutdown.cancelled() => {}
            }
            api_shutdown.cancel();
        })
        .await?;

    // Let the indexer finish or roll back its in-flight page.
    shutdown.cancel();
    let outcome = indexer_task.await?;
    pool.close().await;

    outcome.map_err(|e| anyhow::anyhow!("indexer failed: {e}"))
}
