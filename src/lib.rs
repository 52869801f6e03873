//! Chain asset indexing engine: multicall batching, token-list
//! aggregation and account balance tracking for EVM networks.

pub mod assets;
pub mod balances;
pub mod configs;
pub mod errors;
pub mod events;
pub mod logger;
pub mod multicall;
pub mod networks;
pub mod rpc;
pub mod services;
pub mod storage;
