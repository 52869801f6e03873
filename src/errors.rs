/// Error taxonomy for the indexing engine
///
/// Errors are grouped by the failure domain they belong to so that callers
/// can tell transient transport problems (retried next cycle) apart from
/// per-call decode problems (isolated to one result) and from storage
/// degradation (memory-only fallback).
use thiserror::Error;

/// Transport-level RPC failures. Always transient from the engine's point of
/// view: the affected cycle is dropped and the next scheduled cycle retries.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed JSON-RPC response: {0}")]
    MalformedResponse(String),
}

/// Failure to decode a single call's return data. Taints only that call
/// unless the batch was submitted with `require_success`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("return data too short: {len} bytes")]
    TooShort { len: usize },

    #[error("abi decode failed: {0}")]
    Abi(String),
}

/// Batch-level failures from the call batcher.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("transport failure: {0}")]
    Transport(#[from] RpcError),

    #[error("call {index} failed in require-success batch")]
    CallFailed { index: usize },

    #[error("call {index} returned undecodable data in require-success batch: {source}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },

    #[error("aggregator response malformed: {0}")]
    MalformedAggregate(String),

    #[error("network {chain_id} does not support batching")]
    UnsupportedNetwork { chain_id: String },
}

/// Per-source token list failures. Terminal for the cycle, retried on the
/// next scheduled refresh.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("fetch of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("fetch of {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("document from {url} is malformed: {reason}")]
    Malformed { url: String, reason: String },
}

/// Persistence failures. The engine degrades to in-memory operation and
/// keeps going; these are logged, never propagated into indexing state.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record for key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_error_wraps_transport() {
        let err = BatchError::from(RpcError::Rpc {
            code: -32000,
            message: "execution reverted".into(),
        });
        assert!(matches!(err, BatchError::Transport(_)));
        assert!(err.to_string().contains("execution reverted"));
    }
}
