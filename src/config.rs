use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub keepalive: KeepAliveConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    /// Name of the environment variable holding the bot token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketConfig {
    #[serde(default = "default_market_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeepAliveConfig {
    #[serde(default = "default_keepalive_enabled")]
    pub enabled: bool,
    #[serde(default = "default_keepalive_bind")]
    pub bind: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            command_prefix: default_command_prefix(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_base_url(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: default_keepalive_enabled(),
            bind: default_keepalive_bind(),
        }
    }
}

fn default_token_env() -> String {
    "TOKEN".to_string()
}

fn default_command_prefix() -> String {
    "-".to_string()
}

fn default_market_base_url() -> String {
    "https://api.warframe.market".to_string()
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("allowed_channels.json")
}

fn default_keepalive_enabled() -> bool {
    true
}

fn default_keepalive_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.discord.command_prefix.trim().is_empty() {
            anyhow::bail!("discord.command_prefix must not be empty");
        }
        Ok(config)
    }

    /// Reads the bot token from the configured environment variable.
    pub fn discord_token(&self) -> Result<String> {
        let name = &self.discord.token_env;
        match std::env::var(name) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => anyhow::bail!(
                "No token provided. Please set the {} environment variable.",
                name
            ),
        }
    }
}
