mod config;
mod dispatcher;
mod keepalive;
mod market;
mod platform;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::market::MarketClient;
use crate::registry::RegistryStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up the token from .env if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pricebot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration; an explicitly named file must exist
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => Config::load_or_default(&PathBuf::from("config.toml"))
            .context("Failed to load config from config.toml")?,
    };

    let token = config.discord_token()?;

    info!("Configuration loaded successfully");
    info!("  Command prefix: {}", config.discord.command_prefix);
    info!("  Market API: {}", config.market.base_url);
    info!("  Channel registry: {}", config.registry.path.display());

    let registry = Arc::new(
        RegistryStore::open(&config.registry.path).context("Failed to load channel registry")?,
    );
    let market = Arc::new(MarketClient::new(&config.market.base_url)?);
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        market,
        &config.discord.command_prefix,
    ));

    if config.keepalive.enabled {
        keepalive::spawn(&config.keepalive.bind).await?;
    }

    info!("Bot is starting...");
    platform::discord::run(&token, dispatcher).await?;

    Ok(())
}
