//! Ethereum JSON-RPC client.
//!
//! Provides a thin wrapper around an HTTP JSON-RPC endpoint with:
//! - An optional client-side request quota
//! - A per-request timeout
//! - Proper error handling
//!
//! Every call is attempted exactly once; failures are returned to the caller.

use crate::config::RpcConfig;
use crate::ledger::{LedgerClient, TransactionDetail};
use crate::schemas::BlockNumber;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("JSON-RPC error: code={code}, message={message}")]
    JsonRpc { code: i64, message: String },

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[serde(default)]
    result: serde_json::Value,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Ethereum block with transaction hashes
#[derive(Debug, Deserialize)]
struct Block {
    transactions: Vec<String>,
}

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Ethereum JSON-RPC client over HTTP.
pub struct EthRpcClient {
    client: reqwest::Client,
    url: String,
    rate_limiter: Option<DirectRateLimiter>,
    request_id: AtomicU64,
}

impl EthRpcClient {
    pub fn new(config: &RpcConfig) -> Result<Self, RpcError> {
        let rate_limiter = config
            .quota()
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(20)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            rate_limiter,
            request_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Make a single RPC call.
    ///
    /// A `null` result is reported as [`RpcError::NotFound`].
    async fn call<P: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, RpcError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params: &params,
            id: self.next_id(),
        };

        let response = self.client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(RpcError::Status(response.status().as_u16()));
        }

        let json_response: JsonRpcResponse = response.json().await?;

        if let Some(error) = json_response.error {
            return Err(RpcError::JsonRpc {
                code: error.code,
                message: error.message,
            });
        }

        if json_response.result.is_null() {
            return Err(RpcError::NotFound(method.to_string()));
        }

        Ok(serde_json::from_value(json_response.result)?)
    }
}

#[async_trait]
impl LedgerClient for EthRpcClient {
    /// Get block by number (with transaction hashes only)
    async fn get_block(&self, number: BlockNumber) -> Result<Vec<String>, RpcError> {
        let hex_block = format!("0x{:x}", number);
        debug!("eth_getBlockByNumber {}", hex_block);
        let block: Block = self
            .call("eth_getBlockByNumber", (hex_block.as_str(), false))
            .await
            .map_err(|e| match e {
                RpcError::NotFound(_) => RpcError::NotFound(format!("block {}", number)),
                other => other,
            })?;
        Ok(block.transactions)
    }

    /// Get transaction by hash
    async fn get_transaction(&self, hash: &str) -> Result<TransactionDetail, RpcError> {
        debug!("eth_getTransactionByHash {}", hash);
        self.call("eth_getTransactionByHash", [hash])
            .await
            .map_err(|e| match e {
                RpcError::NotFound(_) => RpcError::NotFound(format!("transaction {}", hash)),
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::Server) -> EthRpcClient {
        let config = RpcConfig {
            url: server.url(),
            ..RpcConfig::default()
        };
        EthRpcClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_block_returns_hashes_in_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_getBlockByNumber",
                "params": ["0x64", false]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": { "number": "0x64", "transactions": ["0x02", "0x01"] }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let hashes = client.get_block(U256::from(100u64)).await.unwrap();

        assert_eq!(hashes, vec!["0x02".to_string(), "0x01".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_transaction_detail() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_getTransactionByHash",
                "params": ["0xaa"]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "hash": "0xaa",
                        "from": "0xbb",
                        "input": "0x",
                        "nonce": "0x1",
                        "value": "0x10",
                        "gas": "0x5208"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let detail = client.get_transaction("0xaa").await.unwrap();

        assert_eq!(detail.from.as_deref(), Some("0xbb"));
        assert_eq!(detail.value.as_deref(), Some("0x10"));
        assert_eq!(detail.nonce.as_deref(), Some("0x1"));
    }

    #[tokio::test]
    async fn test_null_result_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": null }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_transaction("0xaa").await.unwrap_err();
        assert!(matches!(err, RpcError::NotFound(ref what) if what.contains("0xaa")));
    }

    #[tokio::test]
    async fn test_json_rpc_error_is_returned_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32005, "message": "rate limit exceeded" }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_block(U256::from(1u64)).await.unwrap_err();
        assert!(matches!(err, RpcError::JsonRpc { code: -32005, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(503)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_block(U256::from(1u64)).await.unwrap_err();
        assert!(matches!(err, RpcError::Status(503)));
    }
}
