/// Persistence for custom assets and cached token lists
///
/// The engine hydrates its asset cache from storage at startup and writes
/// fetched token lists back best-effort: a storage failure is logged and
/// the in-memory state stays authoritative. The trait keeps the engine
/// decoupled from any particular backing store; `MemoryStore` backs tests
/// and ephemeral runs.
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::assets::Asset;
use crate::assets::token_list::TokenListDocument;
use crate::errors::StorageError;
use crate::logger::{self, LogTag};

#[async_trait]
pub trait Persistence: Send + Sync {
    /// All custom assets for the given network.
    async fn get_custom_assets(&self, chain_id: &str) -> Result<Vec<Asset>, StorageError>;

    async fn put_custom_asset(&self, asset: &Asset) -> Result<(), StorageError>;

    async fn remove_custom_asset(
        &self,
        chain_id: &str,
        contract_address: &str,
    ) -> Result<(), StorageError>;

    /// The most recent cached copy of a token list, if any.
    async fn get_cached_token_list(
        &self,
        url: &str,
    ) -> Result<Option<TokenListDocument>, StorageError>;

    async fn put_cached_token_list(
        &self,
        url: &str,
        document: &TokenListDocument,
    ) -> Result<(), StorageError>;
}

/// Write a token list to storage, downgrading failures to a warning.
pub async fn write_back_token_list(
    store: &dyn Persistence,
    url: &str,
    document: &TokenListDocument,
) {
    if let Err(e) = store.put_cached_token_list(url, document).await {
        logger::warning(
            LogTag::Storage,
            &format!("could not persist token list {url}: {e}"),
        );
    }
}

#[derive(Default)]
pub struct MemoryStore {
    custom_assets: RwLock<HashMap<String, Vec<Asset>>>,
    token_lists: RwLock<HashMap<String, TokenListDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn get_custom_assets(&self, chain_id: &str) -> Result<Vec<Asset>, StorageError> {
        Ok(self
            .custom_assets
            .read()
            .unwrap()
            .get(chain_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_custom_asset(&self, asset: &Asset) -> Result<(), StorageError> {
        let mut assets = self.custom_assets.write().unwrap();
        let entries = assets.entry(asset.chain_id().to_string()).or_default();
        // Replace any previous copy of the same asset
        entries.retain(|existing| existing.id() != asset.id());
        entries.push(asset.clone());
        Ok(())
    }

    async fn remove_custom_asset(
        &self,
        chain_id: &str,
        contract_address: &str,
    ) -> Result<(), StorageError> {
        let needle = contract_address.to_lowercase();
        if let Some(entries) = self.custom_assets.write().unwrap().get_mut(chain_id) {
            entries.retain(|asset| asset.contract_address() != Some(needle.as_str()));
        }
        Ok(())
    }

    async fn get_cached_token_list(
        &self,
        url: &str,
    ) -> Result<Option<TokenListDocument>, StorageError> {
        Ok(self.token_lists.read().unwrap().get(url).cloned())
    }

    async fn put_cached_token_list(
        &self,
        url: &str,
        document: &TokenListDocument,
    ) -> Result<(), StorageError> {
        self.token_lists
            .write()
            .unwrap()
            .insert(url.to_string(), document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::token_list::tests_support::document_with_tokens;

    #[tokio::test]
    async fn custom_asset_round_trip_replaces_duplicates() {
        let store = MemoryStore::new();
        let first = Asset::fungible("1", "0xAbC0000000000000000000000000000000000001", "CUST", "Custom", 18);
        let updated = Asset::fungible("1", "0xabc0000000000000000000000000000000000001", "CUST", "Custom Token", 18);

        store.put_custom_asset(&first).await.unwrap();
        store.put_custom_asset(&updated).await.unwrap();

        let assets = store.get_custom_assets("1").await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].name(), "Custom Token");
    }

    #[tokio::test]
    async fn remove_custom_asset_is_case_insensitive() {
        let store = MemoryStore::new();
        let asset = Asset::fungible("1", "0xabc0000000000000000000000000000000000001", "CUST", "Custom", 18);
        store.put_custom_asset(&asset).await.unwrap();

        store
            .remove_custom_asset("1", "0xABC0000000000000000000000000000000000001")
            .await
            .unwrap();

        assert!(store.get_custom_assets("1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn token_list_cache_round_trip() {
        let store = MemoryStore::new();
        let url = "https://list.example/tokens.json";
        assert!(store.get_cached_token_list(url).await.unwrap().is_none());

        let document = document_with_tokens("Cached", &[("0xaaa0000000000000000000000000000000000001", "AAA", 18)]);
        store.put_cached_token_list(url, &document).await.unwrap();

        let loaded = store.get_cached_token_list(url).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Cached");
        assert_eq!(loaded.tokens.len(), 1);
    }
}
