//! Log feed client: polls the JSON-RPC `getLogs` method for escrow
//! contract logs.
//!
//! ## Resilience
//!
//! * Exponential back-off is applied when the RPC returns an error or rate-limit
//!   response, up to [`MAX_BACKOFF_SECS`] seconds.
//! * Transient network errors (connection reset, timeout) are retried silently.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{IndexerError, Result};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<LogsResult>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResult {
    pub logs: Vec<RawLog>,
    pub cursor: Option<String>,
    pub latest_block: Option<u64>,
}

/// One log as delivered by the feed: the event name plus its decoded
/// parameters and chain coordinates. Numeric fields are kept as raw JSON
/// because feeds disagree on number vs. string encoding.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    /// Event name or full signature, e.g. `GigCreated`.
    pub event: String,
    #[serde(default)]
    pub params: Value,
    pub block_number: Option<Value>,
    pub block_timestamp: Option<Value>,
    pub transaction_hash: Option<String>,
    pub transaction_index: Option<Value>,
    pub log_index: Option<Value>,
}

/// One page of the feed.
#[derive(Debug)]
pub struct LogPage {
    pub logs: Vec<RawLog>,
    pub cursor: Option<String>,
    pub latest_block: Option<u64>,
}

// ─────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────

/// Fetch a page of logs from the feed.
///
/// * `from_block`: the block to scan from (inclusive), used when there is no cursor.
/// * `cursor`: optional opaque pagination cursor from a previous response.
/// * `limit`: maximum number of logs to return.
pub async fn fetch_logs(
    client: &Client,
    rpc_url: &str,
    contract_address: &str,
    from_block: u64,
    cursor: Option<&str>,
    limit: u32,
) -> Result<LogPage> {
    let mut backoff = INITIAL_BACKOFF_SECS;
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "getLogs",
        "params": build_params(contract_address, from_block, cursor, limit),
    });

    loop {
        let retry_reason = match client.post(rpc_url).json(&request).send().await {
            Err(e) => format!("request failed: {e}"),
            Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                "rate-limited".to_string()
            }
            Ok(resp) => {
                let body: RpcResponse = resp.json().await?;
                match body.error {
                    Some(err) if is_hard_error(err.code) => {
                        return Err(IndexerError::Rpc(format!(
                            "hard error {}: {}",
                            err.code, err.message
                        )));
                    }
                    Some(err) => format!("soft error {} {}", err.code, err.message),
                    None => return into_page(body.result),
                }
            }
        };
        backoff = wait_and_back_off(&retry_reason, backoff).await;
    }
}

fn into_page(result: Option<LogsResult>) -> Result<LogPage> {
    let result =
        result.ok_or_else(|| IndexerError::Rpc("empty result from getLogs".to_string()))?;
    debug!(
        "Fetched {} logs (latest_block={:?})",
        result.logs.len(),
        result.latest_block
    );
    Ok(LogPage {
        logs: result.logs,
        cursor: result.cursor,
        latest_block: result.latest_block,
    })
}

/// Sleep for `backoff` seconds and return the next delay.
async fn wait_and_back_off(reason: &str, backoff: u64) -> u64 {
    warn!("RPC {reason} (will retry in {backoff}s)");
    tokio::time::sleep(Duration::from_secs(backoff)).await;
    next_backoff(backoff)
}

fn next_backoff(current: u64) -> u64 {
    (current * 2).min(MAX_BACKOFF_SECS)
}

/// Invalid request / unknown method will not fix themselves on retry.
fn is_hard_error(code: i64) -> bool {
    code == -32600 || code == -32601
}

fn build_params(contract_address: &str, from_block: u64, cursor: Option<&str>, limit: u32) -> Value {
    let mut params = json!({
        "address": contract_address,
        "pagination": {
            "limit": limit
        }
    });

    if let Some(cur) = cursor {
        params["pagination"]["cursor"] = json!(cur);
    } else {
        params["fromBlock"] = json!(from_block);
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_use_from_block_without_cursor() {
        let params = build_params("0xcontract", 42, None, 100);
        assert_eq!(params["address"], "0xcontract");
        assert_eq!(params["fromBlock"], 42);
        assert_eq!(params["pagination"]["limit"], 100);
        assert!(params["pagination"].get("cursor").is_none());
    }

    #[test]
    fn params_prefer_cursor() {
        let params = build_params("0xcontract", 42, Some("abc"), 10);
        assert_eq!(params["pagination"]["cursor"], "abc");
        assert!(params.get("fromBlock").is_none());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(next_backoff(2), 4);
        assert_eq!(next_backoff(32), MAX_BACKOFF_SECS);
        assert_eq!(next_backoff(MAX_BACKOFF_SECS), MAX_BACKOFF_SECS);
    }

    #[test]
    fn hard_errors_are_not_retried() {
        assert!(is_hard_error(-32600));
        assert!(is_hard_error(-32601));
        assert!(!is_hard_error(-32005));
    }

    #[test]
    fn missing_result_is_an_rpc_error() {
        let err = into_page(None).unwrap_err();
        assert!(matches!(err, IndexerError::Rpc(_)));
    }

    #[tokio::test]
    async fn hard_error_is_returned_without_retry() {
        use axum::{routing::post, Json, Router};

        let app = Router::new().route(
            "/",
            post(|| async {
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32601, "message": "method not found" }
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            fetch_logs(&Client::new(), &url, "0xcontract", 0, None, 10),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, IndexerError::Rpc(ref msg) if msg.contains("-32601")));
    }

    #[test]
    fn parse_rpc_response() {
        let body = r#"{
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "logs": [{
                    "event": "GigCreated",
                    "params": { "gigId": "234", "creator": "0x00000000000000000000000000000000000000aa", "amount": "1000000" },
                    "blockNumber": "0x11",
                    "blockTimestamp": 1000,
                    "transactionHash": "0xfeed",
                    "transactionIndex": 0,
                    "logIndex": 3
                }],
                "cursor": "next-1",
                "latestBlock": 20
            }
        }"#;
        let parsed: RpcResponse = serde_json::from_str(body).unwrap();
        let result = parsed.result.unwrap();
        assert_eq!(result.logs.len(), 1);
        assert_eq!(result.logs[0].event, "GigCreated");
        assert_eq!(result.logs[0].params["gigId"], "234");
        assert_eq!(result.cursor.as_deref(), Some("next-1"));
        assert_eq!(result.latest_block, Some(20));
        assert!(parsed.error.is_none());
    }
}
