/// Balance polling and token list refresh
///
/// One poller task per tracked network plus one shared token-list refresh
/// task. A poll cycle reads the network's merged asset sequence and issues
/// a single tolerant batch per account: the base asset via the aggregator's
/// `getEthBalance` plus `balanceOf` for every contract asset. Balances are
/// collected for the whole cycle and applied to the store in one call, so a
/// cycle cancelled mid-flight leaves the store untouched.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::assets::cache::AssetCache;
use crate::assets::token_list::{TokenListDocument, TokenListFetcher};
use crate::assets::{Asset, AssetId, AssetKey};
use crate::balances::{AccountBalance, BalanceStore};
use crate::configs::Configs;
use crate::errors::BatchError;
use crate::logger::{self, LogTag};
use crate::multicall::aggregator_address;
use crate::multicall::batcher::{BatchCall, BatchOptions, CallBatcher};
use crate::networks::Network;
use crate::rpc::{JsonRpcClient, RpcTransport};
use crate::services::{Service, ShutdownSignal};
use crate::storage::{self, Persistence};

pub struct IndexingService {
    configs: Configs,
    cache: Arc<AssetCache>,
    balances: Arc<BalanceStore>,
    fetcher: Arc<TokenListFetcher>,
    store: Arc<dyn Persistence>,
    transports: HashMap<String, Arc<dyn RpcTransport>>,
    networks: Vec<Network>,
    accounts: Vec<(Address, String)>,
}

impl IndexingService {
    pub fn new(
        configs: Configs,
        cache: Arc<AssetCache>,
        balances: Arc<BalanceStore>,
        fetcher: Arc<TokenListFetcher>,
        store: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            configs,
            cache,
            balances,
            fetcher,
            store,
            transports: HashMap::new(),
            networks: Vec::new(),
            accounts: Vec::new(),
        }
    }

    /// Install a transport for one chain, replacing the one built from
    /// config. Used by tests and embedders with their own RPC plumbing.
    pub fn set_transport(&mut self, chain_id: &str, transport: Arc<dyn RpcTransport>) {
        self.transports.insert(chain_id.to_string(), transport);
    }

    /// Load persisted state into the in-memory caches. Storage failures
    /// are logged and skipped; the engine starts cold in that case.
    async fn hydrate(&self) {
        for url in &self.configs.token_lists.urls {
            match self.store.get_cached_token_list(url).await {
                Ok(Some(document)) => {
                    self.fetcher.seed_document(url, document.clone());
                    for chain_id in self.cache.tracked_chain_ids() {
                        self.cache
                            .apply_list_documents(&chain_id, vec![(url.clone(), document.clone())]);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    logger::warning(
                        LogTag::Storage,
                        &format!("could not hydrate token list {url}: {e}"),
                    );
                }
            }
        }

        for network in &self.networks {
            match self.store.get_custom_assets(&network.chain_id).await {
                Ok(assets) => {
                    for asset in assets {
                        self.cache.add_custom_asset(asset);
                    }
                }
                Err(e) => {
                    logger::warning(
                        LogTag::Storage,
                        &format!(
                            "could not hydrate custom assets for chain {}: {e}",
                            network.chain_id
                        ),
                    );
                }
            }
        }
    }

    fn spawn_refresh_task(&self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let fetcher = self.fetcher.clone();
        let cache = self.cache.clone();
        let store = self.store.clone();
        let urls = self.configs.token_lists.urls.clone();
        let interval = Duration::from_secs(self.configs.token_lists.refresh_interval_secs);

        tokio::spawn(async move {
            let mut shutdown = shutdown;
            loop {
                // Racing the cycle against the signal drops an in-flight
                // fetch on shutdown instead of letting it finish late.
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = run_refresh_cycle(&fetcher, &cache, store.as_ref(), &urls) => {}
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    }

    fn spawn_poller_task(
        &self,
        network: Network,
        transport: Arc<dyn RpcTransport>,
        shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let balances = self.balances.clone();
        let accounts: Vec<(Address, String)> = self.accounts.clone();
        let interval = Duration::from_secs(self.configs.indexing.poll_interval_secs);
        let batcher = CallBatcher::new(transport);

        tokio::spawn(async move {
            let mut shutdown = shutdown;
            loop {
                let cycle = async {
                    for (owner, owner_hex) in &accounts {
                        if let Err(e) =
                            poll_account(&batcher, &cache, &balances, &network, *owner, owner_hex)
                                .await
                        {
                            logger::warning(
                                LogTag::Balances,
                                &format!(
                                    "poll failed for {owner_hex} on chain {}: {e}",
                                    network.chain_id
                                ),
                            );
                        }
                    }
                };

                // A cycle cancelled mid-RPC is dropped before it reaches
                // apply_balances, so the store stays as it was.
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = cycle => {}
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    }
}

#[async_trait]
impl Service for IndexingService {
    fn name(&self) -> &'static str {
        "indexing"
    }

    async fn initialize(&mut self) -> Result<()> {
        self.networks = self.configs.tracked_networks();
        let list_priority = self.configs.token_lists.urls.clone();
        let rpc_timeout = Duration::from_secs(self.configs.indexing.rpc_timeout_secs);

        for network in &self.networks {
            self.cache
                .register_network(network.clone(), list_priority.clone());

            if self.transports.contains_key(&network.chain_id) {
                continue;
            }
            match self.configs.rpc_url(&network.chain_id) {
                Some(url) => {
                    self.transports.insert(
                        network.chain_id.clone(),
                        Arc::new(JsonRpcClient::new(url, rpc_timeout)),
                    );
                }
                None => {
                    logger::warning(
                        LogTag::System,
                        &format!(
                            "no RPC endpoint for chain {}, balances will not be polled",
                            network.chain_id
                        ),
                    );
                }
            }
        }

        for account in &self.configs.indexing.accounts {
            match account.parse::<Address>() {
                Ok(address) => self.accounts.push((address, account.to_lowercase())),
                Err(_) => {
                    logger::warning(
                        LogTag::System,
                        &format!("invalid account address in config: {account}"),
                    );
                }
            }
        }

        self.hydrate().await;

        // Accounts show as loading until their first cycle completes
        for network in &self.networks {
            if !self.transports.contains_key(&network.chain_id) {
                continue;
            }
            for (_, owner_hex) in &self.accounts {
                self.balances.mark_loading(owner_hex, &network.chain_id);
            }
        }

        Ok(())
    }

    async fn start(&mut self, shutdown: ShutdownSignal) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = vec![self.spawn_refresh_task(shutdown.clone())];

        for network in self.networks.clone() {
            let Some(transport) = self.transports.get(&network.chain_id).cloned() else {
                continue;
            };
            handles.push(self.spawn_poller_task(network, transport, shutdown.clone()));
        }

        logger::info(
            LogTag::System,
            &format!(
                "indexing {} account(s) across {} network(s)",
                self.accounts.len(),
                handles.len() - 1
            ),
        );

        Ok(handles)
    }
}

/// Insert a user-added asset: persist it first (best-effort, a storage
/// failure costs only restart durability) and merge it into the cache
/// immediately. Returns whether the merged sequence changed.
pub async fn add_custom_asset(
    cache: &AssetCache,
    store: &dyn Persistence,
    asset: Asset,
) -> bool {
    if let Err(e) = store.put_custom_asset(&asset).await {
        logger::warning(
            LogTag::Storage,
            &format!("could not persist custom asset {}: {e}", asset.id()),
        );
    }
    cache.add_custom_asset(asset)
}

/// Remove a user-added asset from the cache and from storage.
pub async fn remove_custom_asset(
    cache: &AssetCache,
    store: &dyn Persistence,
    id: &AssetId,
) -> bool {
    if let AssetKey::Contract(address) = &id.key {
        if let Err(e) = store.remove_custom_asset(&id.chain_id, address).await {
            logger::warning(
                LogTag::Storage,
                &format!("could not remove custom asset {id} from storage: {e}"),
            );
        }
    }
    cache.remove_custom_asset(id)
}

/// Fetch every configured list, feed the fresh documents to all tracked
/// networks and write them back to storage best-effort. Failed sources
/// keep their previous copy downstream.
async fn run_refresh_cycle(
    fetcher: &TokenListFetcher,
    cache: &AssetCache,
    store: &dyn Persistence,
    urls: &[String],
) {
    let results = fetcher.fetch_all(urls).await;

    let fresh: Vec<(String, TokenListDocument)> = results
        .into_iter()
        .filter_map(|(url, result)| result.ok().map(|document| (url, document)))
        .collect();

    for (url, document) in &fresh {
        storage::write_back_token_list(store, url, document).await;
    }

    for chain_id in cache.tracked_chain_ids() {
        cache.apply_list_documents(&chain_id, fresh.clone());
    }
}

/// The calls for one account's cycle, aligned with the assets they read.
/// The base asset is only readable through the aggregator's `getEthBalance`
/// helper, so it is skipped on networks without a deployment.
fn build_balance_calls(network: &Network, owner: Address, assets: &[Asset]) -> (Vec<BatchCall>, Vec<Asset>) {
    let aggregator = aggregator_address(&network.chain_id);
    let mut calls = Vec::new();
    let mut read = Vec::new();

    for asset in assets {
        match asset {
            Asset::Base { .. } => {
                if let Some(aggregator) = aggregator {
                    calls.push(BatchCall::native_balance(aggregator, owner));
                    read.push(asset.clone());
                }
            }
            Asset::Fungible {
                contract_address, ..
            } => {
                if let Ok(token) = contract_address.parse::<Address>() {
                    calls.push(BatchCall::erc20_balance_of(token, owner));
                    read.push(asset.clone());
                }
            }
            // NFT collections have no fungible balance to read here
            Asset::Nft { .. } => {}
        }
    }

    (calls, read)
}

async fn poll_account(
    batcher: &CallBatcher,
    cache: &AssetCache,
    balances: &BalanceStore,
    network: &Network,
    owner: Address,
    owner_hex: &str,
) -> Result<(), BatchError> {
    let assets = cache.get_assets(&network.chain_id);
    let (calls, read) = build_balance_calls(network, owner, &assets);
    let call_count = calls.len();

    let results = batcher
        .execute_batch(network, calls, BatchOptions::default())
        .await?;

    let mut collected = Vec::with_capacity(results.len());
    for (asset, result) in read.into_iter().zip(results) {
        if !result.success {
            logger::debug(
                LogTag::Balances,
                &format!(
                    "balance read failed for {} on chain {}",
                    asset.symbol(),
                    network.chain_id
                ),
            );
            continue;
        }
        if let Some(amount) = result.uint() {
            collected.push(AccountBalance::from_network_call(owner_hex, asset, amount));
        }
    }

    logger::debug(
        LogTag::Balances,
        &format!(
            "cycle for {owner_hex} on chain {}: {} of {call_count} reads usable",
            network.chain_id,
            collected.len()
        ),
    );

    // Single visible mutation per cycle
    balances.apply_balances(owner_hex, &network.chain_id, collected);
    Ok(())
}
