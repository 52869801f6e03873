/// Canonical per-network asset registry
///
/// Holds the latest merged asset sequence for every tracked network. The
/// merge order invariant: base asset first, then custom assets in insertion
/// order, then token-list assets in configured list priority order. No two
/// entries share an identity key; a duplicate hit unions provenance
/// metadata into the entry that is already present.
///
/// Merges for one network are serialized behind a per-network mutex;
/// networks never block each other. A change notification is published at
/// most once per merge that actually changed the ordered identity-key
/// sequence, so idle refresh cycles stay silent downstream.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::assets::token_list::TokenListDocument;
use crate::assets::{Asset, AssetId};
use crate::events::{EventBus, IndexerEvent};
use crate::logger::{self, LogTag};
use crate::networks::Network;

struct NetworkCacheState {
    network: Network,
    /// User-added assets, insertion order preserved.
    custom_assets: Vec<Asset>,
    /// Last good document per source URL.
    documents: HashMap<String, TokenListDocument>,
    /// Source URLs in configured merge priority order.
    list_priority: Vec<String>,
    merged: Vec<Asset>,
    merged_ids: Vec<AssetId>,
    /// Set by `invalidate`; consumed by the poller to force a re-fetch.
    stale: bool,
}

impl NetworkCacheState {
    fn merge(&self) -> Vec<Asset> {
        let mut sequence: Vec<Asset> = vec![Asset::base_for(&self.network)];
        let mut index: HashMap<AssetId, usize> = HashMap::new();
        index.insert(sequence[0].id(), 0);

        let append = |sequence: &mut Vec<Asset>, index: &mut HashMap<AssetId, usize>, asset: &Asset| {
            let id = asset.id();
            match index.get(&id) {
                Some(&position) => {
                    // Duplicate identity: union provenance into the entry
                    // that won the ordering race.
                    sequence[position].metadata_mut().merge_from(asset.metadata());
                }
                None => {
                    index.insert(id, sequence.len());
                    sequence.push(asset.clone());
                }
            }
        };

        for asset in &self.custom_assets {
            append(&mut sequence, &mut index, asset);
        }

        for url in &self.list_priority {
            if let Some(document) = self.documents.get(url) {
                for asset in document.assets_for_network(url, &self.network.chain_id) {
                    append(&mut sequence, &mut index, &asset);
                }
            }
        }

        sequence
    }
}

pub struct AssetCache {
    networks: DashMap<String, Arc<Mutex<NetworkCacheState>>>,
    events: EventBus,
}

impl AssetCache {
    pub fn new(events: EventBus) -> Self {
        Self {
            networks: DashMap::new(),
            events,
        }
    }

    /// Start tracking a network. The initial merged sequence is just the
    /// base asset; no notification is published until content changes.
    pub fn register_network(&self, network: Network, list_priority: Vec<String>) {
        let base = Asset::base_for(&network);
        let base_id = base.id();
        let state = NetworkCacheState {
            network,
            custom_assets: Vec::new(),
            documents: HashMap::new(),
            list_priority,
            merged: vec![base],
            merged_ids: vec![base_id],
            stale: false,
        };
        self.networks
            .insert(state.network.chain_id.clone(), Arc::new(Mutex::new(state)));
    }

    fn state_for(&self, chain_id: &str) -> Option<Arc<Mutex<NetworkCacheState>>> {
        self.networks.get(chain_id).map(|entry| entry.value().clone())
    }

    /// Read-only snapshot of the merged sequence for a network.
    pub fn get_assets(&self, chain_id: &str) -> Vec<Asset> {
        match self.state_for(chain_id) {
            Some(state) => state.lock().unwrap().merged.clone(),
            None => Vec::new(),
        }
    }

    /// Remerge under the per-network lock and publish a notification only
    /// when the ordered identity-key sequence changed.
    fn remerge_and_notify(&self, state: &Arc<Mutex<NetworkCacheState>>) -> bool {
        let chain_id;
        let changed;
        {
            let mut guard = state.lock().unwrap();
            let merged = guard.merge();
            let merged_ids: Vec<AssetId> = merged.iter().map(Asset::id).collect();
            changed = merged_ids != guard.merged_ids;
            guard.merged = merged;
            guard.merged_ids = merged_ids;
            chain_id = guard.network.chain_id.clone();
        }

        if changed {
            logger::debug(
                LogTag::Assets,
                &format!("asset sequence changed for chain {chain_id}"),
            );
            self.events.publish(IndexerEvent::AssetsUpdated { chain_id });
        }
        changed
    }

    /// Insert a user-added asset immediately (no waiting for the next
    /// refresh cycle) and re-run the merge with the cached lists. Returns
    /// whether the merged sequence changed.
    pub fn add_custom_asset(&self, asset: Asset) -> bool {
        let Some(state) = self.state_for(asset.chain_id()) else {
            logger::warning(
                LogTag::Assets,
                &format!("custom asset for untracked chain {}", asset.chain_id()),
            );
            return false;
        };

        {
            let mut guard = state.lock().unwrap();
            let id = asset.id();
            if guard.custom_assets.iter().any(|a| a.id() == id) {
                return false;
            }
            guard.custom_assets.push(asset);
        }

        self.remerge_and_notify(&state)
    }

    /// Explicit user removal of a custom asset.
    pub fn remove_custom_asset(&self, id: &AssetId) -> bool {
        let Some(state) = self.state_for(&id.chain_id) else {
            return false;
        };

        {
            let mut guard = state.lock().unwrap();
            let before = guard.custom_assets.len();
            guard.custom_assets.retain(|a| &a.id() != id);
            if guard.custom_assets.len() == before {
                return false;
            }
        }

        self.remerge_and_notify(&state)
    }

    /// Store freshly fetched documents and re-merge. Sources that failed
    /// this cycle are simply absent from `documents` and keep their
    /// previous copy, so a transient failure never shrinks the cache.
    pub fn apply_list_documents(
        &self,
        chain_id: &str,
        documents: Vec<(String, TokenListDocument)>,
    ) -> bool {
        let Some(state) = self.state_for(chain_id) else {
            return false;
        };

        {
            let mut guard = state.lock().unwrap();
            for (url, document) in documents {
                guard.documents.insert(url, document);
            }
            guard.stale = false;
        }

        self.remerge_and_notify(&state)
    }

    /// Force a re-fetch + merge on the next scheduled cycle.
    pub fn invalidate(&self, chain_id: &str) {
        if let Some(state) = self.state_for(chain_id) {
            state.lock().unwrap().stale = true;
        }
    }

    pub fn is_stale(&self, chain_id: &str) -> bool {
        self.state_for(chain_id)
            .map(|state| state.lock().unwrap().stale)
            .unwrap_or(false)
    }

    pub fn tracked_chain_ids(&self) -> Vec<String> {
        self.networks.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::token_list::tests_support::document_with_tokens;
    use crate::networks::ETHEREUM;

    fn cache_with_ethereum(lists: Vec<String>) -> AssetCache {
        let cache = AssetCache::new(EventBus::new(16));
        cache.register_network(ETHEREUM.clone(), lists);
        cache
    }

    #[test]
    fn sequence_starts_with_base_asset() {
        let cache = cache_with_ethereum(vec![]);
        let assets = cache.get_assets("1");
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].symbol(), "ETH");
    }

    #[test]
    fn merge_order_is_base_then_custom_then_lists() {
        let url = "https://list-a".to_string();
        let cache = cache_with_ethereum(vec![url.clone()]);

        cache.apply_list_documents(
            "1",
            vec![(
                url.clone(),
                document_with_tokens(
                    "List A",
                    &[("0x0000000000000000000000000000000000000010", "AAA", 18)],
                ),
            )],
        );
        cache.add_custom_asset(Asset::fungible(
            "1",
            "0x0000000000000000000000000000000000000020",
            "CUST",
            "Custom",
            18,
        ));

        let assets = cache.get_assets("1");
        let symbols: Vec<&str> = assets.iter().map(|a| a.symbol()).collect();
        assert_eq!(symbols, vec!["ETH", "CUST", "AAA"]);
    }

    #[test]
    fn no_duplicate_identity_keys_and_provenance_union() {
        let url_a = "https://list-a".to_string();
        let url_b = "https://list-b".to_string();
        let cache = cache_with_ethereum(vec![url_a.clone(), url_b.clone()]);

        let shared = ("0x0000000000000000000000000000000000000030", "SHR", 18);
        cache.apply_list_documents(
            "1",
            vec![
                (url_a.clone(), document_with_tokens("List A", &[shared])),
                (url_b.clone(), document_with_tokens("List B", &[shared])),
            ],
        );

        let assets = cache.get_assets("1");
        assert_eq!(assets.len(), 2);

        let lists = &assets[1].metadata().token_lists;
        assert_eq!(lists.len(), 2);
        assert!(lists.iter().any(|r| r.name == "List A"));
        assert!(lists.iter().any(|r| r.name == "List B"));
    }

    #[test]
    fn custom_asset_duplicated_in_list_yields_one_entry_with_both_sources() {
        let url = "https://list-a".to_string();
        let cache = cache_with_ethereum(vec![url.clone()]);

        let address = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
        let mut custom = Asset::fungible("1", address, "USDC", "USD Coin", 6);
        custom.metadata_mut().token_lists.push(crate::assets::TokenListRef {
            url: "custom://user".to_string(),
            name: "User added".to_string(),
            logo_url: None,
        });
        cache.add_custom_asset(custom);
        cache.apply_list_documents(
            "1",
            vec![(url.clone(), document_with_tokens("List A", &[(address, "USDC", 6)]))],
        );

        let assets = cache.get_assets("1");
        assert_eq!(assets.len(), 2, "one merged entry, not two");
        let lists = &assets[1].metadata().token_lists;
        assert!(lists.iter().any(|r| r.url == "custom://user"));
        assert!(lists.iter().any(|r| r.url == url));
    }

    #[test]
    fn notification_fires_once_per_content_change() {
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let url = "https://list-a".to_string();
        let cache = AssetCache::new(events);
        cache.register_network(ETHEREUM.clone(), vec![url.clone()]);

        let document = document_with_tokens(
            "List A",
            &[("0x0000000000000000000000000000000000000040", "AAA", 18)],
        );

        assert!(cache.apply_list_documents("1", vec![(url.clone(), document.clone())]));
        // Identical content on the next cycle: no change, no event
        assert!(!cache.apply_list_documents("1", vec![(url.clone(), document)]));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failed_cycle_never_shrinks_cache() {
        let url = "https://list-a".to_string();
        let cache = cache_with_ethereum(vec![url.clone()]);

        cache.apply_list_documents(
            "1",
            vec![(
                url.clone(),
                document_with_tokens(
                    "List A",
                    &[("0x0000000000000000000000000000000000000050", "AAA", 18)],
                ),
            )],
        );
        assert_eq!(cache.get_assets("1").len(), 2);

        // Cycle with nothing fetched (every source failed): content intact
        assert!(!cache.apply_list_documents("1", vec![]));
        assert_eq!(cache.get_assets("1").len(), 2);

        // Next cycle succeeds with a grown list: cache catches up
        assert!(cache.apply_list_documents(
            "1",
            vec![(
                url,
                document_with_tokens(
                    "List A",
                    &[
                        ("0x0000000000000000000000000000000000000050", "AAA", 18),
                        ("0x0000000000000000000000000000000000000051", "BBB", 6),
                    ],
                ),
            )],
        ));
        assert_eq!(cache.get_assets("1").len(), 3);
    }

    #[test]
    fn invalidate_marks_stale_until_next_apply() {
        let cache = cache_with_ethereum(vec![]);
        assert!(!cache.is_stale("1"));
        cache.invalidate("1");
        assert!(cache.is_stale("1"));
        cache.apply_list_documents("1", vec![]);
        assert!(!cache.is_stale("1"));
    }
}
