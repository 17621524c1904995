use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

pub type ServerId = String;
pub type ChannelId = String;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read channel registry {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed channel registry {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode channel registry: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to write channel registry {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Discord ids are stored as JSON numbers; anything else stays a string.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredId {
    Numeric(u64),
    Text(String),
}

impl From<StoredId> for ChannelId {
    fn from(id: StoredId) -> Self {
        match id {
            StoredId::Numeric(n) => n.to_string(),
            StoredId::Text(s) => s,
        }
    }
}

impl From<&str> for StoredId {
    fn from(id: &str) -> Self {
        match id.parse::<u64>() {
            Ok(n) if n.to_string() == id => StoredId::Numeric(n),
            _ => StoredId::Text(id.to_string()),
        }
    }
}

/// Per-server designated channel. At most one channel per server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRegistry {
    channels: BTreeMap<ServerId, ChannelId>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_channel(&mut self, server: &str, channel: &str) {
        self.channels.insert(server.to_string(), channel.to_string());
    }

    pub fn is_restricted(&self, server: &str) -> bool {
        self.channels.contains_key(server)
    }

    pub fn channel_for(&self, server: &str) -> Option<&str> {
        self.channels.get(server).map(String::as_str)
    }

    pub fn is_allowed(&self, server: &str, channel: &str) -> bool {
        !self.is_restricted(server) || self.channel_for(server) == Some(channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let stored: BTreeMap<&str, StoredId> = self
            .channels
            .iter()
            .map(|(server, channel)| (server.as_str(), StoredId::from(channel.as_str())))
            .collect();
        serde_json::to_string(&stored)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let stored: BTreeMap<ServerId, StoredId> = serde_json::from_str(json)?;
        Ok(Self {
            channels: stored
                .into_iter()
                .map(|(server, channel)| (server, channel.into()))
                .collect(),
        })
    }

    /// Reads the registry file. A missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(RegistryError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_json(&content).map_err(|source| RegistryError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rewrites the whole registry file via a sibling `.tmp` file renamed
    /// over the target.
    pub async fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let json = self.to_json().map_err(RegistryError::Encode)?;
        let tmp = temp_path(path);
        let write_err = |source: std::io::Error| RegistryError::Write {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_err)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// File-backed registry shared between event handlers.
pub struct RegistryStore {
    path: PathBuf,
    registry: Mutex<ChannelRegistry>,
}

impl RegistryStore {
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let registry = ChannelRegistry::load(path)?;
        info!(
            "Channel registry loaded from {} ({} servers)",
            path.display(),
            registry.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            registry: Mutex::new(registry),
        })
    }

    /// Sets the designated channel and persists the registry. The lock is
    /// held across the write; memory only changes once the write succeeded.
    pub async fn set_channel(&self, server: &str, channel: &str) -> Result<(), RegistryError> {
        let mut registry = self.registry.lock().await;
        let mut updated = registry.clone();
        updated.set_channel(server, channel);
        updated.save(&self.path).await?;
        *registry = updated;
        info!("Server {} restricted to channel {}", server, channel);
        Ok(())
    }

    pub async fn is_allowed(&self, server: &str, channel: &str) -> bool {
        self.registry.lock().await.is_allowed(server, channel)
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> ChannelRegistry {
        self.registry.lock().await.clone()
    }
}
