/// Network capability registry for the Multicall3 aggregator
///
/// Multicall3 is deployed at the same address on most chains; a small
/// override table covers chains with a non-canonical deployment (zkSync
/// Era's CREATE2 addressing lands it elsewhere). Networks in neither table
/// do not support batching and fall back to individual calls.
pub mod batcher;

use std::collections::HashMap;

use alloy_primitives::{address, Address};
use once_cell::sync::Lazy;

pub const MULTICALL_CONTRACT_ADDRESS: Address =
    address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Chain IDs with the canonical Multicall3 deployment.
static CHAIN_IDS_WITH_CANONICAL_DEPLOYMENT: &[&str] = &[
    "1", "3", "4", "5", "10", "42", "137", "69", "100", "420", "42161", "421611", "421613",
    "80001", "11155111", "43114", "43113", "4002", "250", "56", "97", "1284", "1285", "1287",
    "1666600000", "25", "122", "19", "16", "288", "1313161554", "592", "66", "128", "1088", "30",
    "31", "9001", "9000", "108", "18", "26863", "42220", "71402", "71401", "8217", "2001", "321",
    "111", "59140",
];

/// Chain ID -> non-canonical aggregator address.
static CHAIN_SPECIFIC_AGGREGATOR_ADDRESSES: Lazy<HashMap<&'static str, Address>> =
    Lazy::new(|| {
        let mut map = HashMap::new();
        // zkSync Era
        map.insert(
            "324",
            "0x47898b2c52c957663ae9ab46922dcec150a2272c"
                .parse()
                .expect("static aggregator address"),
        );
        map
    });

/// Whether the network has a known aggregator deployment.
pub fn supports_batching(chain_id: &str) -> bool {
    CHAIN_IDS_WITH_CANONICAL_DEPLOYMENT.contains(&chain_id)
        || CHAIN_SPECIFIC_AGGREGATOR_ADDRESSES.contains_key(chain_id)
}

/// The aggregator address for the network, if any.
pub fn aggregator_address(chain_id: &str) -> Option<Address> {
    if let Some(address) = CHAIN_SPECIFIC_AGGREGATOR_ADDRESSES.get(chain_id) {
        return Some(*address);
    }
    if CHAIN_IDS_WITH_CANONICAL_DEPLOYMENT.contains(&chain_id) {
        return Some(MULTICALL_CONTRACT_ADDRESS);
    }
    None
}
