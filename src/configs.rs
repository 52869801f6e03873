/// Configuration for the indexing engine
///
/// All structures are defined with the `config_struct!` macro so the field,
/// its type and its default live in a single declaration. Configuration is
/// loaded from a TOML file; missing fields fall back to defaults via
/// `#[serde(default)]`.
use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

use crate::networks::{builtin_network, Network};

/// Define a configuration struct with embedded defaults.
///
/// Generates the struct with public fields, a `Default` implementation with
/// the given values, and serde support with `#[serde(default)]`.
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}

config_struct! {
    /// Logger configuration
    pub struct LoggerSection {
        min_level: String = "info".to_string(),
        debug_tags: Vec<String> = Vec::new(),
    }
}

config_struct! {
    /// Which chains to index and how to reach them
    pub struct NetworksSection {
        /// Built-in networks to track, by chain ID.
        chain_ids: Vec<String> = vec!["1".to_string()],
        /// Networks not in the built-in table.
        custom: Vec<Network> = Vec::new(),
        /// JSON-RPC endpoint per chain ID.
        rpc_urls: HashMap<String, String> = HashMap::new(),
    }
}

config_struct! {
    /// Token list sources, in merge priority order
    pub struct TokenListsSection {
        urls: Vec<String> = vec![
            "https://gateway.ipfs.io/ipns/tokens.uniswap.org".to_string(),
        ],
        fetch_timeout_secs: u64 = 10,
        refresh_interval_secs: u64 = 600,
    }
}

config_struct! {
    /// Balance polling configuration
    pub struct IndexingSection {
        /// Accounts to track (hex addresses).
        accounts: Vec<String> = Vec::new(),
        poll_interval_secs: u64 = 60,
        rpc_timeout_secs: u64 = 10,
    }
}

config_struct! {
    /// Top-level configuration
    pub struct Configs {
        logger: LoggerSection = LoggerSection::default(),
        networks: NetworksSection = NetworksSection::default(),
        token_lists: TokenListsSection = TokenListsSection::default(),
        indexing: IndexingSection = IndexingSection::default(),
    }
}

impl Configs {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let configs: Configs = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(configs)
    }

    /// Resolve the configured chain IDs against the built-in table and
    /// append custom networks. Unknown chain IDs are skipped with a warning
    /// rather than failing startup.
    pub fn tracked_networks(&self) -> Vec<Network> {
        let mut tracked: Vec<Network> = Vec::new();

        for chain_id in &self.networks.chain_ids {
            match builtin_network(chain_id) {
                Some(network) => tracked.push(network.clone()),
                None => {
                    crate::logger::warning(
                        crate::logger::LogTag::System,
                        &format!("unknown built-in chain ID {chain_id} in config, skipping"),
                    );
                }
            }
        }

        for network in &self.networks.custom {
            if !tracked.iter().any(|n| n == network) {
                tracked.push(network.clone());
            }
        }

        tracked
    }

    pub fn rpc_url(&self, chain_id: &str) -> Option<&str> {
        self.networks.rpc_urls.get(chain_id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_track_ethereum() {
        let configs = Configs::default();
        let tracked = configs.tracked_networks();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].chain_id, "1");
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [networks]
            chain_ids = ["1", "137"]

            [indexing]
            accounts = ["0x208e94d5661a73360d9387d3ca169e5c130090cd"]
        "#;
        let configs: Configs = toml::from_str(raw).unwrap();
        assert_eq!(configs.networks.chain_ids.len(), 2);
        assert_eq!(configs.indexing.accounts.len(), 1);
        // Untouched sections keep defaults
        assert_eq!(configs.token_lists.fetch_timeout_secs, 10);
    }

    #[test]
    fn custom_network_appended() {
        let mut configs = Configs::default();
        configs
            .networks
            .custom
            .push(Network::new("4242", "Testnet", "TST", "Test", 18));
        let tracked = configs.tracked_networks();
        assert_eq!(tracked.len(), 2);
        assert_eq!(tracked[1].chain_id, "4242");
    }
}
