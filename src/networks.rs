/// EVM network model and built-in network table
///
/// Networks are injected configuration as far as the engine is concerned:
/// the built-ins below cover the common chains, and `Network` values can be
/// constructed from config for anything else. Equality is by chain ID only.
use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Descriptor for a network's native currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAssetDescriptor {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    /// Decimal chain ID string, e.g. "1" for Ethereum mainnet.
    pub chain_id: String,
    pub name: String,
    pub base_asset: BaseAssetDescriptor,
}

impl Network {
    pub fn new(chain_id: &str, name: &str, symbol: &str, asset_name: &str, decimals: u8) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            name: name.to_string(),
            base_asset: BaseAssetDescriptor {
                symbol: symbol.to_string(),
                name: asset_name.to_string(),
                decimals,
            },
        }
    }
}

impl PartialEq for Network {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id
    }
}

impl Eq for Network {}

pub static ETHEREUM: Lazy<Network> =
    Lazy::new(|| Network::new("1", "Ethereum", "ETH", "Ether", 18));

pub static OPTIMISM: Lazy<Network> =
    Lazy::new(|| Network::new("10", "Optimism", "ETH", "Ether", 18));

pub static BNB_CHAIN: Lazy<Network> =
    Lazy::new(|| Network::new("56", "BNB Chain", "BNB", "BNB", 18));

pub static POLYGON: Lazy<Network> =
    Lazy::new(|| Network::new("137", "Polygon", "MATIC", "Matic", 18));

pub static ARBITRUM: Lazy<Network> =
    Lazy::new(|| Network::new("42161", "Arbitrum One", "ETH", "Ether", 18));

pub static AVALANCHE: Lazy<Network> =
    Lazy::new(|| Network::new("43114", "Avalanche", "AVAX", "Avalanche", 18));

pub static ZKSYNC_ERA: Lazy<Network> =
    Lazy::new(|| Network::new("324", "zkSync Era", "ETH", "Ether", 18));

/// Built-in networks keyed by chain ID.
pub static BUILTIN_NETWORKS: Lazy<HashMap<&'static str, &'static Network>> = Lazy::new(|| {
    let networks: Vec<&'static Network> = vec![
        &ETHEREUM,
        &OPTIMISM,
        &BNB_CHAIN,
        &POLYGON,
        &ARBITRUM,
        &AVALANCHE,
        &ZKSYNC_ERA,
    ];

    let mut map = HashMap::new();
    for network in networks {
        map.insert(network.chain_id.as_str(), network);
    }
    map
});

/// Look up a built-in network by chain ID.
pub fn builtin_network(chain_id: &str) -> Option<&'static Network> {
    BUILTIN_NETWORKS.get(chain_id).copied()
}
