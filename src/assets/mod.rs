/// Asset model: base currency, fungible contract tokens and NFT collections
///
/// The three variants are a tagged union so decimals-presence and the shape
/// of the identity key are checked by the type system: NFTs never carry
/// decimals, base assets never carry a contract address.
pub mod cache;
pub mod token_list;

use serde::{Deserialize, Serialize};

use crate::networks::Network;

/// Provenance record for an asset seen in a token list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenListRef {
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// Mutable asset metadata, shared across accounts through the balance
/// store's metadata table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    /// One entry per token list the asset was seen in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_lists: Vec<TokenListRef>,
}

impl AssetMetadata {
    /// Union `other` into `self`: provenance entries are deduplicated by
    /// list URL, and the most informative (non-empty) scalar fields win.
    pub fn merge_from(&mut self, other: &AssetMetadata) {
        if self.trusted.is_none() {
            self.trusted = other.trusted;
        }
        if self.logo_url.is_none() {
            self.logo_url = other.logo_url.clone();
        }
        for list_ref in &other.token_lists {
            if !self.token_lists.iter().any(|r| r.url == list_ref.url) {
                self.token_lists.push(list_ref.clone());
            }
        }
    }
}

/// Identity key: (chain ID, contract address) for contract assets,
/// (chain ID, symbol) for the base asset. Addresses are lowercased on
/// construction so comparison is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId {
    pub chain_id: String,
    pub key: AssetKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKey {
    Contract(String),
    BaseSymbol(String),
}

impl AssetId {
    pub fn contract(chain_id: &str, address: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            key: AssetKey::Contract(address.to_lowercase()),
        }
    }

    pub fn base(chain_id: &str, symbol: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            key: AssetKey::BaseSymbol(symbol.to_string()),
        }
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            AssetKey::Contract(address) => write!(f, "{}:{}", self.chain_id, address),
            AssetKey::BaseSymbol(symbol) => write!(f, "{}:base:{}", self.chain_id, symbol),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
    /// The network's native currency.
    Base {
        chain_id: String,
        symbol: String,
        name: String,
        decimals: u8,
        #[serde(default)]
        metadata: AssetMetadata,
    },
    /// A fungible contract token (ERC-20 shaped).
    Fungible {
        chain_id: String,
        /// Lowercased hex address.
        contract_address: String,
        symbol: String,
        name: String,
        decimals: u8,
        #[serde(default)]
        metadata: AssetMetadata,
    },
    /// An NFT collection. No decimals by construction.
    Nft {
        chain_id: String,
        contract_address: String,
        symbol: String,
        name: String,
        #[serde(default)]
        metadata: AssetMetadata,
    },
}

impl Asset {
    pub fn base_for(network: &Network) -> Self {
        Asset::Base {
            chain_id: network.chain_id.clone(),
            symbol: network.base_asset.symbol.clone(),
            name: network.base_asset.name.clone(),
            decimals: network.base_asset.decimals,
            metadata: AssetMetadata::default(),
        }
    }

    pub fn fungible(
        chain_id: &str,
        contract_address: &str,
        symbol: &str,
        name: &str,
        decimals: u8,
    ) -> Self {
        Asset::Fungible {
            chain_id: chain_id.to_string(),
            contract_address: contract_address.to_lowercase(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
            metadata: AssetMetadata::default(),
        }
    }

    pub fn id(&self) -> AssetId {
        match self {
            Asset::Base {
                chain_id, symbol, ..
            } => AssetId::base(chain_id, symbol),
            Asset::Fungible {
                chain_id,
                contract_address,
                ..
            }
            | Asset::Nft {
                chain_id,
                contract_address,
                ..
            } => AssetId::contract(chain_id, contract_address),
        }
    }

    pub fn chain_id(&self) -> &str {
        match self {
            Asset::Base { chain_id, .. }
            | Asset::Fungible { chain_id, .. }
            | Asset::Nft { chain_id, .. } => chain_id,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Asset::Base { symbol, .. }
            | Asset::Fungible { symbol, .. }
            | Asset::Nft { symbol, .. } => symbol,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Asset::Base { name, .. }
            | Asset::Fungible { name, .. }
            | Asset::Nft { name, .. } => name,
        }
    }

    pub fn decimals(&self) -> Option<u8> {
        match self {
            Asset::Base { decimals, .. } | Asset::Fungible { decimals, .. } => Some(*decimals),
            Asset::Nft { .. } => None,
        }
    }

    pub fn contract_address(&self) -> Option<&str> {
        match self {
            Asset::Base { .. } => None,
            Asset::Fungible {
                contract_address, ..
            }
            | Asset::Nft {
                contract_address, ..
            } => Some(contract_address),
        }
    }

    pub fn metadata(&self) -> &AssetMetadata {
        match self {
            Asset::Base { metadata, .. }
            | Asset::Fungible { metadata, .. }
            | Asset::Nft { metadata, .. } => metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut AssetMetadata {
        match self {
            Asset::Base { metadata, .. }
            | Asset::Fungible { metadata, .. }
            | Asset::Nft { metadata, .. } => metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::ETHEREUM;

    #[test]
    fn identity_is_case_insensitive_for_addresses() {
        let a = Asset::fungible("1", "0xA0b86991C6218b36c1d19D4a2e9Eb0cE3606eB48", "USDC", "USD Coin", 6);
        let b = Asset::fungible("1", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USDC", "USD Coin", 6);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn base_asset_identity_uses_symbol() {
        let base = Asset::base_for(&ETHEREUM);
        assert_eq!(base.id(), AssetId::base("1", "ETH"));
        assert_eq!(base.decimals(), Some(18));
        assert!(base.contract_address().is_none());
    }

    #[test]
    fn nft_has_no_decimals() {
        let nft = Asset::Nft {
            chain_id: "1".to_string(),
            contract_address: "0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d".to_string(),
            symbol: "BAYC".to_string(),
            name: "Bored Ape Yacht Club".to_string(),
            metadata: AssetMetadata::default(),
        };
        assert_eq!(nft.decimals(), None);
    }

    #[test]
    fn metadata_merge_unions_provenance_and_keeps_informative_fields() {
        let mut meta = AssetMetadata {
            trusted: None,
            logo_url: Some("https://a/logo.png".to_string()),
            token_lists: vec![TokenListRef {
                url: "https://list-a".to_string(),
                name: "List A".to_string(),
                logo_url: None,
            }],
        };
        let other = AssetMetadata {
            trusted: Some(true),
            logo_url: Some("https://b/logo.png".to_string()),
            token_lists: vec![
                TokenListRef {
                    url: "https://list-a".to_string(),
                    name: "List A".to_string(),
                    logo_url: None,
                },
                TokenListRef {
                    url: "https://list-b".to_string(),
                    name: "List B".to_string(),
                    logo_url: None,
                },
            ],
        };

        meta.merge_from(&other);

        assert_eq!(meta.trusted, Some(true));
        // Existing non-empty field wins
        assert_eq!(meta.logo_url.as_deref(), Some("https://a/logo.png"));
        assert_eq!(meta.token_lists.len(), 2);
    }
}
