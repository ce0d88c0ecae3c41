//! Long-running background task that polls the log feed and projects
//! decoded escrow events into the database.
//!
//! Each poll is one unit of work: the page's gigs, activities and the
//! advanced cursor are committed in a single transaction. A failed or
//! cancelled poll rolls back and the page is fetched again from the last
//! committed cursor.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::db::{self, SqliteStore};
use crate::decoder;
use crate::errors::Result;
use crate::projector;
use crate::rpc;

pub struct IndexerState {
    pub pool: SqlitePool,
    pub config: Config,
    pub client: Client,
}

/// Run the indexer loop until `shutdown` is cancelled.
///
/// Failing to read the saved cursor is fatal: restarting from
/// `start_block` would silently rescan the chain.
pub async fn run(state: Arc<IndexerState>, shutdown: CancellationToken) -> Result<()> {
    info!(
        "Indexer starting for contract {}",
        state.config.contract_address
    );

    // Load the cursor from the DB; fall back to config start_block.
    let last_block = db::get_last_block(&state.pool).await?;
    let cursor_str = db::get_cursor_string(&state.pool).await?;

    let mut current_block = if last_block > 0 {
        last_block as u64
    } else {
        state.config.start_block
    };
    let mut cursor: Option<String> = cursor_str;

    info!("Resuming from block {current_block}");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            polled = poll_once(
                &state.pool,
                &state.client,
                &state.config,
                current_block,
                cursor.as_deref(),
            ) => match polled {
                Ok((next_block, next_cursor)) => {
                    current_block = next_block;
                    cursor = next_cursor;
                }
                Err(e) => {
                    error!("Indexer poll error: {e}");
                }
            },
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(state.config.poll_interval_secs)) => {}
        }
    }

    info!("Indexer stopped at block {current_block}");
    Ok(())
}

/// Perform a single poll iteration.
///
/// Returns `(next_start_block, next_cursor)`.
pub async fn poll_once(
    pool: &SqlitePool,
    client: &Client,
    config: &Config,
    start_block: u64,
    cursor: Option<&str>,
) -> Result<(u64, Option<String>)> {
    let page = rpc::fetch_logs(
        client,
        &config.rpc_url,
        &config.contract_address,
        start_block,
        cursor,
        config.logs_per_page,
    )
    .await?;

    // Decode the whole page before touching the store so a malformed log
    // rejects the page without opening a transaction.
    let events = decoder::decode_logs(&page.logs)?;

    // Advance the block cursor:
    // - If there is a next cursor string, the next call paginates with it.
    // - Otherwise the next call scans from the latest known block.
    let next_block = page
        .latest_block
        .map(|b| b.max(start_block))
        .unwrap_or(start_block);

    let mut store = SqliteStore::begin(pool).await?;
    let stats = projector::apply_all(&mut store, &events).await?;
    // Persist cursor so restarts are deterministic.
    store
        .save_cursor(next_block as i64, page.cursor.as_deref())
        .await?;
    store.commit().await?;

    if !page.logs.is_empty() {
        info!(
            "Polled {} raw logs → {} events applied ({} created, {} updated, {} discarded, {} duplicate)",
            page.logs.len(),
            stats.accepted(),
            stats.created,
            stats.updated,
            stats.discarded,
            stats.duplicates
        );
    }

    Ok((next_block, page.cursor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_pool;
    use crate::db::SortOrder;
    use crate::errors::IndexerError;
    use crate::gig::GigStatus;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    const CREATOR: &str = "0x00000000000000000000000000000000000000aa";
    const WRITER: &str = "0x00000000000000000000000000000000000000bb";

    /// Serve `body` as the response to every JSON-RPC call.
    async fn serve_feed(body: Value) -> String {
        let app = Router::new().route(
            "/",
            post(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Serve an empty page and record every request body.
    async fn serve_recording_feed() -> (String, Arc<Mutex<Vec<Value>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        let app = Router::new().route(
            "/",
            post(move |Json(request): Json<Value>| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(request);
                    Json(json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "result": { "logs": [], "cursor": "c2", "latestBlock": 30 }
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), requests)
    }

    /// Run the indexer until it has sent one request, then stop it and
    /// return that request's params.
    async fn first_request_params(pool: SqlitePool, config: Config) -> Value {
        let (url, requests) = serve_recording_feed().await;
        let state = Arc::new(IndexerState {
            pool,
            config: Config {
                rpc_url: url,
                ..config
            },
            client: Client::new(),
        });
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(state, shutdown.clone()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while requests.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        shutdown.cancel();
        task.await.unwrap().unwrap();

        let first = requests.lock().unwrap()[0].clone();
        first["params"].clone()
    }

    fn config(rpc_url: String) -> Config {
        Config {
            rpc_url,
            contract_address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
            database_url: "sqlite::memory:".to_string(),
            api_port: 0,
            poll_interval_secs: 1,
            logs_per_page: 100,
            start_block: 0,
        }
    }

    fn log(event: &str, params: Value, block: u64, timestamp: i64, log_index: u64) -> Value {
        json!({
            "event": event,
            "params": params,
            "blockNumber": block,
            "blockTimestamp": timestamp,
            "transactionHash": format!("0x{block:064x}"),
            "transactionIndex": 0,
            "logIndex": log_index,
        })
    }

    fn page(logs: Vec<Value>) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "logs": logs, "cursor": "c1", "latestBlock": 20 }
        })
    }

    #[tokio::test]
    async fn poll_projects_page_and_saves_cursor() {
        let url = serve_feed(page(vec![
            log(
                "GigCreated",
                json!({ "gigId": "234", "creator": CREATOR, "amount": "1000000" }),
                10,
                1000,
                0,
            ),
            log(
                "InviteSent",
                json!({ "gigId": "234", "creator": CREATOR, "writer": WRITER }),
                12,
                2000,
                0,
            ),
            log("InviteSent", json!({ "gigId": "999", "creator": CREATOR }), 12, 2000, 1),
        ]))
        .await;
        let pool = memory_pool().await;
        let client = Client::new();
        let config = config(url);

        let (next_block, next_cursor) = poll_once(&pool, &client, &config, 0, None)
            .await
            .unwrap();
        assert_eq!(next_block, 20);
        assert_eq!(next_cursor.as_deref(), Some("c1"));

        let gig = db::get_gig(&pool, "234").await.unwrap().unwrap();
        assert_eq!(gig.status, GigStatus::InviteSent);
        assert_eq!(gig.creator, CREATOR);
        assert_eq!(gig.created_at, 1000);
        assert_eq!(gig.last_updated, 2000);
        assert!(db::get_gig(&pool, "999").await.unwrap().is_none());
        assert_eq!(db::get_last_block(&pool).await.unwrap(), 20);
        assert_eq!(
            db::get_cursor_string(&pool).await.unwrap().as_deref(),
            Some("c1")
        );

        // The same page delivered again changes nothing.
        poll_once(&pool, &client, &config, 0, None).await.unwrap();
        let history = db::get_activities(&pool, Some("234"), SortOrder::Asc)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn malformed_page_commits_nothing() {
        let url = serve_feed(page(vec![
            log(
                "GigCreated",
                json!({ "gigId": "1", "creator": CREATOR, "amount": "5" }),
                10,
                1000,
                0,
            ),
            log("GigCreated", json!({ "gigId": "2", "creator": CREATOR }), 10, 1000, 1),
        ]))
        .await;
        let pool = memory_pool().await;

        let result = poll_once(&pool, &Client::new(), &config(url), 0, None).await;
        assert!(result.is_err());
        assert!(db::get_all_gigs(&pool).await.unwrap().is_empty());
        assert_eq!(db::get_last_block(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_returns_once_cancelled() {
        let pool = memory_pool().await;
        let state = Arc::new(IndexerState {
            pool,
            config: config("http://127.0.0.1:9".to_string()),
            client: Client::new(),
        });
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), run(state, shutdown))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn run_resumes_from_committed_cursor() {
        let pool = memory_pool().await;
        let mut store = SqliteStore::begin(&pool).await.unwrap();
        store.save_cursor(15, Some("c-saved")).await.unwrap();
        store.commit().await.unwrap();

        let params = first_request_params(pool, config(String::new())).await;
        assert_eq!(params["pagination"]["cursor"], "c-saved");
        assert!(params.get("fromBlock").is_none());
    }

    #[tokio::test]
    async fn fresh_database_starts_from_configured_block() {
        let pool = memory_pool().await;
        let config = Config {
            start_block: 1200,
            ..config(String::new())
        };

        let params = first_request_params(pool, config).await;
        assert_eq!(params["fromBlock"], 1200);
        assert!(params["pagination"].get("cursor").is_none());
    }

    #[tokio::test]
    async fn run_fails_when_cursor_cannot_be_read() {
        let pool = memory_pool().await;
        pool.close().await;
        let state = Arc::new(IndexerState {
            pool,
            config: config("http://127.0.0.1:9".to_string()),
            client: Client::new(),
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            run(state, CancellationToken::new()),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, IndexerError::Database(_)));
    }
}
