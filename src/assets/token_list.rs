/// Token list fetching and parsing
///
/// Consumes the standard token-list document format:
/// `{ name, timestamp, version{major,minor,patch}, tokens[...] }`. One
/// document can cover many chains; entries are filtered per network at
/// merge time. Each configured source runs through a small state machine
/// per refresh cycle: Pending -> Fetching -> Merged | FetchFailed. A failed
/// source is retried on the next scheduled cycle and never blocks the merge
/// of sources that succeeded.
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::assets::{Asset, AssetMetadata, TokenListRef};
use crate::errors::ListError;
use crate::logger::{self, LogTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenListVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenListEntry {
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    pub address: String,
    pub name: String,
    pub decimals: u8,
    pub symbol: String,
    #[serde(rename = "logoURI", default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenListDocument {
    pub name: String,
    pub timestamp: String,
    pub version: TokenListVersion,
    pub tokens: Vec<TokenListEntry>,
}

impl TokenListDocument {
    /// Convert the entries matching `chain_id` into fungible assets, each
    /// carrying a provenance record pointing back at this list.
    pub fn assets_for_network(&self, source_url: &str, chain_id: &str) -> Vec<Asset> {
        self.tokens
            .iter()
            .filter(|entry| entry.chain_id.to_string() == chain_id)
            .map(|entry| {
                let mut asset = Asset::fungible(
                    chain_id,
                    &entry.address,
                    &entry.symbol,
                    &entry.name,
                    entry.decimals,
                );
                *asset.metadata_mut() = AssetMetadata {
                    trusted: None,
                    logo_url: entry.logo_uri.clone(),
                    token_lists: vec![TokenListRef {
                        url: source_url.to_string(),
                        name: self.name.clone(),
                        logo_url: entry.logo_uri.clone(),
                    }],
                };
                asset
            })
            .collect()
    }
}

/// Per-source fetch state for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Pending,
    Fetching,
    Merged { at: DateTime<Utc> },
    FetchFailed { reason: String, at: DateTime<Utc> },
}

/// Fetches token list documents with independent per-source timeouts.
pub struct TokenListFetcher {
    client: Client,
    timeout: Duration,
    states: DashMap<String, SourceState>,
    /// Last successfully parsed document per URL. A failed fetch keeps the
    /// previous document so the downstream cache never shrinks.
    last_good: RwLock<std::collections::HashMap<String, TokenListDocument>>,
}

impl TokenListFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
            states: DashMap::new(),
            last_good: RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn source_state(&self, url: &str) -> SourceState {
        self.states
            .get(url)
            .map(|s| s.clone())
            .unwrap_or(SourceState::Pending)
    }

    /// Seed a document fetched out-of-band (e.g. hydrated from persistence).
    pub fn seed_document(&self, url: &str, document: TokenListDocument) {
        self.last_good
            .write()
            .unwrap()
            .insert(url.to_string(), document);
    }

    pub fn last_good_document(&self, url: &str) -> Option<TokenListDocument> {
        self.last_good.read().unwrap().get(url).cloned()
    }

    async fn fetch_one(&self, url: &str) -> Result<TokenListDocument, ListError> {
        self.states
            .insert(url.to_string(), SourceState::Fetching);

        let request = self.client.get(url).timeout(self.timeout).send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Err(_) => {
                return Err(ListError::Timeout {
                    url: url.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) if e.is_timeout() => {
                return Err(ListError::Timeout {
                    url: url.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) => {
                return Err(ListError::Fetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ListError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        response
            .json::<TokenListDocument>()
            .await
            .map_err(|e| ListError::Malformed {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    /// Fetch all sources concurrently. Every source resolves independently;
    /// a timed-out or malformed list is reported as failed for this cycle
    /// without affecting the others. Successful documents replace the
    /// last-good entry for their URL.
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<(String, Result<TokenListDocument, ListError>)> {
        let fetches = urls.iter().map(|url| async move {
            let result = self.fetch_one(url).await;
            (url.clone(), result)
        });

        let results: Vec<(String, Result<TokenListDocument, ListError>)> = join_all(fetches).await;

        for (url, result) in &results {
            match result {
                Ok(document) => {
                    self.states.insert(
                        url.clone(),
                        SourceState::Merged { at: Utc::now() },
                    );
                    self.last_good
                        .write()
                        .unwrap()
                        .insert(url.clone(), document.clone());
                    logger::debug(
                        LogTag::Tokens,
                        &format!("fetched token list {} ({} tokens)", url, document.tokens.len()),
                    );
                }
                Err(e) => {
                    self.states.insert(
                        url.clone(),
                        SourceState::FetchFailed {
                            reason: e.to_string(),
                            at: Utc::now(),
                        },
                    );
                    logger::warning(
                        LogTag::Tokens,
                        &format!("token list fetch failed, keeping previous copy: {e}"),
                    );
                }
            }
        }

        results
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// Build a mainnet document with the given (address, symbol, decimals)
    /// entries.
    pub fn document_with_tokens(name: &str, tokens: &[(&str, &str, u8)]) -> TokenListDocument {
        TokenListDocument {
            name: name.to_string(),
            timestamp: "2022-05-12T18:15:59+00:00".to_string(),
            version: TokenListVersion {
                major: 1,
                minor: 0,
                patch: 0,
            },
            tokens: tokens
                .iter()
                .map(|(address, symbol, decimals)| TokenListEntry {
                    chain_id: 1,
                    address: address.to_string(),
                    name: format!("{symbol} Token"),
                    decimals: *decimals,
                    symbol: symbol.to_string(),
                    logo_uri: None,
                    tags: Vec::new(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> TokenListDocument {
        serde_json::from_value(serde_json::json!({
            "name": "Test",
            "timestamp": "2022-05-12T18:15:59+00:00",
            "version": { "major": 1, "minor": 169, "patch": 0 },
            "tokens": [
                {
                    "chainId": 1,
                    "address": "0x0000000000000000000000000000000000000001",
                    "name": "Some Token",
                    "decimals": 18,
                    "symbol": "TEST",
                    "logoURI": "/logo.svg",
                    "tags": ["earn"]
                },
                {
                    "chainId": 137,
                    "address": "0x0000000000000000000000000000000000000002",
                    "name": "Polygon Token",
                    "decimals": 6,
                    "symbol": "PTK"
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn parses_standard_document() {
        let document = sample_document();
        assert_eq!(document.version.minor, 169);
        assert_eq!(document.tokens.len(), 2);
        assert_eq!(document.tokens[0].tags, vec!["earn".to_string()]);
        assert!(document.tokens[1].logo_uri.is_none());
    }

    #[test]
    fn filters_entries_by_chain_id() {
        let document = sample_document();

        let mainnet = document.assets_for_network("https://list", "1");
        assert_eq!(mainnet.len(), 1);
        assert_eq!(mainnet[0].symbol(), "TEST");
        assert_eq!(
            mainnet[0].metadata().token_lists[0].name,
            "Test".to_string()
        );

        let polygon = document.assets_for_network("https://list", "137");
        assert_eq!(polygon.len(), 1);
        assert_eq!(polygon[0].symbol(), "PTK");
    }

    #[test]
    fn source_state_defaults_to_pending() {
        let fetcher = TokenListFetcher::new(Duration::from_secs(10));
        assert_eq!(fetcher.source_state("https://list"), SourceState::Pending);
    }

    #[test]
    fn seeded_document_is_returned() {
        let fetcher = TokenListFetcher::new(Duration::from_secs(10));
        fetcher.seed_document("https://list", sample_document());
        let doc = fetcher.last_good_document("https://list").unwrap();
        assert_eq!(doc.name, "Test");
    }

    #[tokio::test]
    async fn unreachable_source_reports_fetch_failed() {
        let fetcher = TokenListFetcher::new(Duration::from_millis(200));
        let urls = vec!["http://127.0.0.1:1/list.json".to_string()];

        let results = fetcher.fetch_all(&urls).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_err());
        assert!(matches!(
            fetcher.source_state(&urls[0]),
            SourceState::FetchFailed { .. }
        ));
        // No last-good document appears out of nowhere
        assert!(fetcher.last_good_document(&urls[0]).is_none());
    }
}
