/// Per-network, per-address balance store
///
/// The nested map is `chain ID -> address -> account state`, where account
/// state is an explicit three-state value: `NotStarted` (never attempted),
/// `Loading` (fetch in flight) and `Loaded(map)` (known, possibly empty).
/// Observers must check for `Loading`, not for an empty map: "known empty"
/// is a loaded empty map.
///
/// Asset metadata lives in a shared table keyed by asset identity, not
/// inside each balance record. Read views join against the table, so one
/// metadata write (e.g. marking an asset trusted) is observable through
/// every account holding that asset without re-fetching a single balance.
use std::collections::HashMap;
use std::sync::RwLock;

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assets::{Asset, AssetId, AssetMetadata};
use crate::events::{EventBus, IndexerEvent};
use crate::logger::{self, LogTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceDataSource {
    Local,
    NetworkCall,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    /// Lowercased hex address of the owner.
    pub address: String,
    pub chain_id: String,
    pub asset: Asset,
    /// Amount in the asset's smallest unit. Non-negative by type.
    pub amount: U256,
    pub retrieved_at: DateTime<Utc>,
    pub data_source: BalanceDataSource,
}

impl AccountBalance {
    pub fn from_network_call(address: &str, asset: Asset, amount: U256) -> Self {
        Self {
            address: address.to_lowercase(),
            chain_id: asset.chain_id().to_string(),
            asset,
            amount,
            retrieved_at: Utc::now(),
            data_source: BalanceDataSource::NetworkCall,
        }
    }
}

/// Observable state of one (address, network) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountAssets {
    /// No fetch has ever been attempted.
    NotStarted,
    /// First fetch is in flight.
    Loading,
    /// Balances are known. An empty map means "known empty".
    Loaded(HashMap<String, AccountBalance>),
}

impl AccountAssets {
    pub fn is_loading(&self) -> bool {
        matches!(self, AccountAssets::Loading)
    }
}

enum StoredAccount {
    Loading,
    Loaded(HashMap<String, AccountBalance>),
}

pub struct BalanceStore {
    /// chain ID -> address -> account state. Mutated only through the
    /// single-critical-section operations below.
    accounts: RwLock<HashMap<String, HashMap<String, StoredAccount>>>,
    /// Shared metadata table: asset identity -> metadata.
    metadata: RwLock<HashMap<AssetId, AssetMetadata>>,
    events: EventBus,
}

impl BalanceStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Install the loading state for an account that has no data yet.
    /// A pair that is already loaded is left untouched.
    pub fn mark_loading(&self, address: &str, chain_id: &str) {
        let address = address.to_lowercase();
        let mut accounts = self.accounts.write().unwrap();
        accounts
            .entry(chain_id.to_string())
            .or_default()
            .entry(address)
            .or_insert(StoredAccount::Loading);
    }

    /// Read view for one (address, network) pair, with current shared
    /// metadata joined into every balance's asset.
    pub fn account_assets(&self, address: &str, chain_id: &str) -> AccountAssets {
        let address = address.to_lowercase();
        let accounts = self.accounts.read().unwrap();

        let Some(stored) = accounts.get(chain_id).and_then(|n| n.get(&address)) else {
            return AccountAssets::NotStarted;
        };

        match stored {
            StoredAccount::Loading => AccountAssets::Loading,
            StoredAccount::Loaded(map) => {
                let metadata = self.metadata.read().unwrap();
                let mut view = map.clone();
                for balance in view.values_mut() {
                    if let Some(shared) = metadata.get(&balance.asset.id()) {
                        *balance.asset.metadata_mut() = shared.clone();
                    }
                }
                AccountAssets::Loaded(view)
            }
        }
    }

    pub fn asset_metadata(&self, id: &AssetId) -> Option<AssetMetadata> {
        self.metadata.read().unwrap().get(id).cloned()
    }

    /// Merge a batch of balances into an account's map. The whole batch is
    /// applied as a single visible mutation. Upsert is by asset symbol;
    /// symbols not present in the batch are left untouched. An incoming
    /// balance older than the stored one for the same symbol is skipped,
    /// so a slow stale retry can never regress a fresher value.
    pub fn apply_balances(&self, address: &str, chain_id: &str, balances: Vec<AccountBalance>) {
        let address = address.to_lowercase();

        // Seed the shared metadata table for newly seen assets before the
        // balances become visible.
        {
            let mut metadata = self.metadata.write().unwrap();
            for balance in &balances {
                metadata
                    .entry(balance.asset.id())
                    .or_default()
                    .merge_from(balance.asset.metadata());
            }
        }

        let changed;
        {
            let mut accounts = self.accounts.write().unwrap();
            let slot = accounts
                .entry(chain_id.to_string())
                .or_default()
                .entry(address.clone())
                .or_insert(StoredAccount::Loading);

            // First write replaces the loading sentinel with a fresh map.
            // That transition counts as a content change even for an empty
            // batch: "known empty" is news.
            let was_loading = matches!(slot, StoredAccount::Loading);
            if was_loading {
                *slot = StoredAccount::Loaded(HashMap::new());
            }
            let StoredAccount::Loaded(map) = slot else {
                unreachable!()
            };

            let mut applied = was_loading;
            for balance in balances {
                let key = balance.asset.symbol().to_string();
                match map.get(&key) {
                    Some(existing) if existing.retrieved_at > balance.retrieved_at => {
                        logger::debug(
                            LogTag::Balances,
                            &format!(
                                "skipping stale balance for {key} on chain {chain_id} ({} < {})",
                                balance.retrieved_at, existing.retrieved_at
                            ),
                        );
                    }
                    // Same asset, same amount: refresh the record without
                    // counting it as a content change, so a quiet poll
                    // cycle stays silent downstream.
                    Some(existing)
                        if existing.amount == balance.amount
                            && existing.asset.id() == balance.asset.id() =>
                    {
                        map.insert(key, balance);
                    }
                    _ => {
                        map.insert(key, balance);
                        applied = true;
                    }
                }
            }
            changed = applied;
        }

        if changed {
            self.events.publish(IndexerEvent::BalancesUpdated {
                address,
                chain_id: chain_id.to_string(),
            });
        }
    }

    /// Write to the shared metadata table only. Provided fields win;
    /// provenance already in the table is retained. Every account holding
    /// the asset observes the new metadata on its next read, with no
    /// balance traversal.
    pub fn update_shared_asset_metadata(&self, id: AssetId, mut metadata: AssetMetadata) {
        let mut table = self.metadata.write().unwrap();
        if let Some(existing) = table.get(&id) {
            metadata.merge_from(existing);
        }
        table.insert(id, metadata);
    }

    /// Delete the address's entry on every network.
    pub fn remove_account(&self, address: &str) {
        let address = address.to_lowercase();
        let mut accounts = self.accounts.write().unwrap();
        for network in accounts.values_mut() {
            network.remove(&address);
        }
    }

    /// Filter an asset out of every address's map for one network. Used
    /// when an asset is confirmed transferred away or delisted.
    pub fn remove_asset_from_all_accounts(&self, id: &AssetId, chain_id: &str) {
        let mut touched: Vec<String> = Vec::new();
        {
            let mut accounts = self.accounts.write().unwrap();
            if let Some(network) = accounts.get_mut(chain_id) {
                for (address, stored) in network.iter_mut() {
                    if let StoredAccount::Loaded(map) = stored {
                        let before = map.len();
                        map.retain(|_, balance| &balance.asset.id() != id);
                        if map.len() != before {
                            touched.push(address.clone());
                        }
                    }
                }
            }
        }

        for address in touched {
            self.events.publish(IndexerEvent::BalancesUpdated {
                address,
                chain_id: chain_id.to_string(),
            });
        }
    }
}
