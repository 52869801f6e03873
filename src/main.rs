use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use chainindex::assets::cache::AssetCache;
use chainindex::assets::token_list::TokenListFetcher;
use chainindex::balances::BalanceStore;
use chainindex::configs::Configs;
use chainindex::events::EventBus;
use chainindex::logger::{self, LogLevel, LogTag, LoggerConfig};
use chainindex::services::indexing_service::IndexingService;
use chainindex::services::ServiceManager;
use chainindex::storage::MemoryStore;

#[derive(Parser)]
#[command(name = "chainindex", about = "Chain asset indexing engine")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "configs.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let configs = if args.config.exists() {
        Configs::load(&args.config)?
    } else {
        Configs::default()
    };

    logger::init(&LoggerConfig {
        min_level: LogLevel::parse(&configs.logger.min_level),
        debug_tags: configs
            .logger
            .debug_tags
            .iter()
            .map(|tag| tag.to_lowercase())
            .collect::<HashSet<String>>(),
    });

    logger::info(LogTag::System, "chainindex starting up");
    if !args.config.exists() {
        logger::warning(
            LogTag::System,
            &format!("config file {} not found, using defaults", args.config.display()),
        );
    }

    let events = EventBus::default();
    let cache = Arc::new(AssetCache::new(events.clone()));
    let balances = Arc::new(BalanceStore::new(events.clone()));
    let fetcher = Arc::new(TokenListFetcher::new(Duration::from_secs(
        configs.token_lists.fetch_timeout_secs,
    )));
    let store = Arc::new(MemoryStore::new());

    let mut manager = ServiceManager::new();
    manager.register(Box::new(IndexingService::new(
        configs, cache, balances, fetcher, store,
    )));
    manager.start_all().await?;

    tokio::signal::ctrl_c().await?;
    logger::info(LogTag::System, "shutdown signal received");
    manager.stop_all().await;

    Ok(())
}
