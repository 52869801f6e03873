/// JSON-RPC transport for read-only contract calls
///
/// The engine talks to each network through the `RpcTransport` trait so the
/// batcher can be exercised in tests with a transport that counts
/// round-trips. The production implementation speaks JSON-RPC 2.0
/// (`eth_call` against the latest block) over reqwest with an explicit
/// per-request timeout.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{hex, Address, Bytes};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::RpcError;
use crate::logger::{self, LogTag};

#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Execute a read-only call against `to` and return the raw return
    /// data. One invocation is one RPC round-trip.
    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

pub struct JsonRpcClient {
    client: Client,
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcTransport for JsonRpcClient {
    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "eth_call",
            "params": [
                { "to": format!("{to:?}"), "data": format!("0x{}", hex::encode(&data)) },
                "latest"
            ]
        });

        logger::debug(
            LogTag::Rpc,
            &format!("eth_call to {to:?} ({} bytes calldata)", data.len()),
        );

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout {
                        url: self.url.clone(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    RpcError::Http {
                        url: self.url.clone(),
                        source: e,
                    }
                }
            })?;

        let parsed: JsonRpcResponse = response.json().await.map_err(|e| {
            RpcError::MalformedResponse(format!("invalid JSON body: {e}"))
        })?;

        if let Some(error) = parsed.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = parsed
            .result
            .ok_or_else(|| RpcError::MalformedResponse("missing result field".to_string()))?;

        let raw = hex::decode(result.trim_start_matches("0x"))
            .map_err(|e| RpcError::MalformedResponse(format!("result is not hex: {e}")))?;

        Ok(Bytes::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing_handles_error_objects() {
        let parsed: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"execution reverted"}}"#,
        )
        .unwrap();
        let error = parsed.error.unwrap();
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "execution reverted");
    }

    #[test]
    fn response_parsing_reads_result() {
        let parsed: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"result":"0x0000000000000000000000000000000000000000000000000000000000000001"}"#,
        )
        .unwrap();
        let raw = hex::decode(parsed.result.unwrap().trim_start_matches("0x")).unwrap();
        assert_eq!(raw.len(), 32);
        assert_eq!(raw[31], 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let client = JsonRpcClient::new("http://127.0.0.1:1", Duration::from_millis(200));
        let result = client
            .eth_call(Address::ZERO, Bytes::new())
            .await;
        assert!(matches!(
            result,
            Err(RpcError::Http { .. }) | Err(RpcError::Timeout { .. })
        ));
    }
}
