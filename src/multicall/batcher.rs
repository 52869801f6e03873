/// Batched read-only contract calls
///
/// Collapses N independent contract reads into one aggregator round-trip on
/// networks with a Multicall3 deployment, and into N concurrent individual
/// `eth_call`s everywhere else. Either way the returned results are
/// positionally aligned with the input: exactly one result per call, in
/// call order.
///
/// The batcher is return-type agnostic. It carries opaque return bytes and
/// applies a caller-supplied decoder per call; a decode failure taints only
/// that call's slot unless the batch was submitted with `require_success`.
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, sol_data, SolCall, SolType};
use futures::future::join_all;

use crate::errors::{BatchError, DecodeError, RpcError};
use crate::logger::{self, LogTag};
use crate::multicall::aggregator_address;
use crate::networks::Network;
use crate::rpc::RpcTransport;

sol! {
    /// Multicall3 aggregator interface (https://github.com/mds1/multicall)
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Call3Value {
            address target;
            bool allowFailure;
            uint256 value;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);

        function aggregate3Value(Call3Value[] calldata calls)
            external payable returns (Result[] memory returnData);

        function getEthBalance(address addr) external view returns (uint256 balance);
    }

    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function symbol() external view returns (string);
        function name() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

/// A decoded per-call return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    Uint(U256),
    Text(String),
    Bool(bool),
}

pub type CallDecoder = Arc<dyn Fn(&[u8]) -> Result<DecodedValue, DecodeError> + Send + Sync>;

/// Decode a single ABI-encoded uint256 return word.
pub fn decode_uint256(data: &[u8]) -> Result<DecodedValue, DecodeError> {
    if data.len() < 32 {
        return Err(DecodeError::TooShort { len: data.len() });
    }
    Ok(DecodedValue::Uint(U256::from_be_slice(&data[..32])))
}

/// Decode a single ABI-encoded string return (symbol/name reads).
pub fn decode_string(data: &[u8]) -> Result<DecodedValue, DecodeError> {
    <sol_data::String as SolType>::abi_decode(data)
        .map(DecodedValue::Text)
        .map_err(|e| DecodeError::Abi(e.to_string()))
}

/// Decode a single ABI-encoded bool return word.
pub fn decode_bool(data: &[u8]) -> Result<DecodedValue, DecodeError> {
    if data.len() < 32 {
        return Err(DecodeError::TooShort { len: data.len() });
    }
    Ok(DecodedValue::Bool(data[31] != 0))
}

/// One read call in a batch. Lifetime is a single aggregator round-trip.
#[derive(Clone)]
pub struct BatchCall {
    pub target: Address,
    pub call_data: Bytes,
    /// Only meaningful for aggregator invocations that forward value;
    /// plain reads leave it unset.
    pub value: Option<U256>,
    pub decoder: Option<CallDecoder>,
}

impl BatchCall {
    pub fn new(target: Address, call_data: Bytes) -> Self {
        Self {
            target,
            call_data,
            value: None,
            decoder: None,
        }
    }

    pub fn with_decoder(mut self, decoder: CallDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    /// `balanceOf(owner)` on an ERC-20 token, decoding to a uint.
    pub fn erc20_balance_of(token: Address, owner: Address) -> Self {
        let call_data = IERC20::balanceOfCall { owner }.abi_encode();
        Self::new(token, call_data.into()).with_decoder(Arc::new(decode_uint256))
    }

    /// Native balance via the aggregator's own `getEthBalance` helper, so
    /// the base asset rides in the same round-trip as the token reads.
    pub fn native_balance(aggregator: Address, owner: Address) -> Self {
        let call_data = IMulticall3::getEthBalanceCall { addr: owner }.abi_encode();
        Self::new(aggregator, call_data.into()).with_decoder(Arc::new(decode_uint256))
    }

    /// `symbol()` on an ERC-20 token, decoding to a string.
    pub fn erc20_symbol(token: Address) -> Self {
        let call_data = IERC20::symbolCall {}.abi_encode();
        Self::new(token, call_data.into()).with_decoder(Arc::new(decode_string))
    }

    /// `decimals()` on an ERC-20 token.
    pub fn erc20_decimals(token: Address) -> Self {
        let call_data = IERC20::decimalsCall {}.abi_encode();
        Self::new(token, call_data.into()).with_decoder(Arc::new(decode_uint256))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub success: bool,
    pub return_data: Bytes,
    pub decoded: Option<DecodedValue>,
}

impl BatchResult {
    fn failed() -> Self {
        Self {
            success: false,
            return_data: Bytes::new(),
            decoded: None,
        }
    }

    pub fn uint(&self) -> Option<U256> {
        match &self.decoded {
            Some(DecodedValue::Uint(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.decoded {
            Some(DecodedValue::Text(value)) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// All-or-nothing: any per-call or per-decode failure fails the whole
    /// batch and no partial results are returned.
    pub require_success: bool,
}

pub struct CallBatcher {
    transport: Arc<dyn RpcTransport>,
}

impl CallBatcher {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    /// Execute a batch of read calls against `network`. One aggregator
    /// round-trip when the network supports batching, N concurrent
    /// individual calls otherwise. Results are order-aligned with input.
    pub async fn execute_batch(
        &self,
        network: &Network,
        calls: Vec<BatchCall>,
        options: BatchOptions,
    ) -> Result<Vec<BatchResult>, BatchError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        match aggregator_address(&network.chain_id) {
            Some(aggregator) => self.execute_aggregated(aggregator, calls, options).await,
            None => self.execute_individually(calls, options).await,
        }
    }

    /// Like `execute_batch`, but refuses the individual-call fallback.
    /// For callers that depend on single-round-trip semantics; asking for
    /// this on a network without a deployment is a configuration error.
    pub async fn execute_batch_no_fallback(
        &self,
        network: &Network,
        calls: Vec<BatchCall>,
        options: BatchOptions,
    ) -> Result<Vec<BatchResult>, BatchError> {
        let Some(aggregator) = aggregator_address(&network.chain_id) else {
            return Err(BatchError::UnsupportedNetwork {
                chain_id: network.chain_id.clone(),
            });
        };
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        self.execute_aggregated(aggregator, calls, options).await
    }

    async fn execute_aggregated(
        &self,
        aggregator: Address,
        calls: Vec<BatchCall>,
        options: BatchOptions,
    ) -> Result<Vec<BatchResult>, BatchError> {
        let allow_failure = !options.require_success;
        let expected = calls.len();

        // aggregate3Value is only needed when a call forwards value.
        let call_data = if calls.iter().any(|c| c.value.is_some()) {
            let encoded: Vec<IMulticall3::Call3Value> = calls
                .iter()
                .map(|call| IMulticall3::Call3Value {
                    target: call.target,
                    allowFailure: allow_failure,
                    value: call.value.unwrap_or(U256::ZERO),
                    callData: call.call_data.clone(),
                })
                .collect();
            IMulticall3::aggregate3ValueCall { calls: encoded }.abi_encode()
        } else {
            let encoded: Vec<IMulticall3::Call3> = calls
                .iter()
                .map(|call| IMulticall3::Call3 {
                    target: call.target,
                    allowFailure: allow_failure,
                    callData: call.call_data.clone(),
                })
                .collect();
            IMulticall3::aggregate3Call { calls: encoded }.abi_encode()
        };

        logger::debug(
            LogTag::Multicall,
            &format!("submitting {expected} calls in one aggregator round-trip"),
        );

        let raw = self
            .transport
            .eth_call(aggregator, call_data.into())
            .await?;

        let returned = IMulticall3::aggregate3Call::abi_decode_returns(&raw)
            .map_err(|e| BatchError::MalformedAggregate(e.to_string()))?;

        if returned.len() != expected {
            return Err(BatchError::MalformedAggregate(format!(
                "{} results for {expected} calls",
                returned.len()
            )));
        }

        let mut results = Vec::with_capacity(expected);
        for (index, (slot, call)) in returned.into_iter().zip(calls.iter()).enumerate() {
            if !slot.success {
                if options.require_success {
                    return Err(BatchError::CallFailed { index });
                }
                results.push(BatchResult::failed());
                continue;
            }
            results.push(Self::finish_result(
                index,
                slot.returnData,
                call,
                options.require_success,
            )?);
        }

        Ok(results)
    }

    async fn execute_individually(
        &self,
        calls: Vec<BatchCall>,
        options: BatchOptions,
    ) -> Result<Vec<BatchResult>, BatchError> {
        logger::debug(
            LogTag::Multicall,
            &format!(
                "no aggregator deployment, issuing {} individual calls",
                calls.len()
            ),
        );

        // Independent outstanding requests, no ordering dependency between
        // them; join_all preserves input order in the output.
        let futures = calls.iter().map(|call| {
            let transport = self.transport.clone();
            async move { transport.eth_call(call.target, call.call_data.clone()).await }
        });
        let outcomes: Vec<Result<Bytes, RpcError>> = join_all(futures).await;

        let mut results = Vec::with_capacity(calls.len());
        for (index, (outcome, call)) in outcomes.into_iter().zip(calls.iter()).enumerate() {
            match outcome {
                Ok(return_data) => {
                    results.push(Self::finish_result(
                        index,
                        return_data,
                        call,
                        options.require_success,
                    )?);
                }
                // An on-chain revert is a per-call failure; connection-level
                // problems fail the batch as a whole.
                Err(RpcError::Rpc { .. }) => {
                    if options.require_success {
                        return Err(BatchError::CallFailed { index });
                    }
                    results.push(BatchResult::failed());
                }
                Err(transport_error) => return Err(BatchError::Transport(transport_error)),
            }
        }

        Ok(results)
    }

    fn finish_result(
        index: usize,
        return_data: Bytes,
        call: &BatchCall,
        require_success: bool,
    ) -> Result<BatchResult, BatchError> {
        let decoded = match &call.decoder {
            None => None,
            Some(decoder) => match decoder(&return_data) {
                Ok(value) => Some(value),
                Err(source) => {
                    if require_success {
                        return Err(BatchError::Decode { index, source });
                    }
                    logger::debug(
                        LogTag::Multicall,
                        &format!("decode failed for call {index}: {source}"),
                    );
                    return Ok(BatchResult::failed());
                }
            },
        };

        Ok(BatchResult {
            success: true,
            return_data,
            decoded,
        })
    }
}
