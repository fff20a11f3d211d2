use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{StoreError, StoreResult};

pub mod filesystem;
pub mod gateway;
pub mod memory;

pub use filesystem::FileSystemTier;
pub use gateway::StorageGateway;
pub use memory::MemoryTier;

/// The two logical stores the extension writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Small, quota-limited, replicated across the user's devices.
    Synced,
    /// Large, device-only.
    Local,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Synced => f.write_str("synced"),
            Tier::Local => f.write_str("local"),
        }
    }
}

/// Every key the current schema persists, with its fixed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Prompts,
    History,
    Settings,
    CacheData,
    UiState,
    CustomLogo,
    AppTitle,
    ModelConfigs,
    SettingsPageState,
}

impl StorageKey {
    pub const ALL: [StorageKey; 9] = [
        StorageKey::Prompts,
        StorageKey::History,
        StorageKey::Settings,
        StorageKey::CacheData,
        StorageKey::UiState,
        StorageKey::CustomLogo,
        StorageKey::AppTitle,
        StorageKey::ModelConfigs,
        StorageKey::SettingsPageState,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Prompts => "prompts",
            StorageKey::History => "history",
            StorageKey::Settings => "settings",
            StorageKey::CacheData => "cacheData",
            StorageKey::UiState => "uiState",
            StorageKey::CustomLogo => "customLogo",
            StorageKey::AppTitle => "appTitle",
            StorageKey::ModelConfigs => "ai_model_configs",
            StorageKey::SettingsPageState => "settingsPageState",
        }
    }

    /// Routing table: small structured data syncs, bulky or device-specific data stays local.
    pub const fn tier(&self) -> Tier {
        match self {
            StorageKey::Prompts | StorageKey::History | StorageKey::Settings => Tier::Synced,
            StorageKey::CacheData
            | StorageKey::UiState
            | StorageKey::CustomLogo
            | StorageKey::AppTitle
            | StorageKey::ModelConfigs
            | StorageKey::SettingsPageState => Tier::Local,
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait defining the operations of one key-value tier.
///
/// Semantics follow the browser storage areas: `get` omits absent keys, `set`
/// merges into existing contents, `remove` ignores keys that do not exist.
#[async_trait]
pub trait KeyValueTier: Send + Sync + 'static {
    fn tier(&self) -> Tier;

    async fn get(&self, keys: &[&str]) -> StoreResult<Map<String, Value>>;

    /// Writes all entries or none of them.
    async fn set(&self, entries: Map<String, Value>) -> StoreResult<()>;

    async fn remove(&self, keys: &[&str]) -> StoreResult<()>;
}

/// Byte limits applied to a tier. Sizes are measured as key length plus the
/// length of the JSON-encoded value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierQuota {
    pub total_bytes: Option<usize>,
    pub per_item_bytes: Option<usize>,
}

impl TierQuota {
    pub const fn unlimited() -> Self {
        Self {
            total_bytes: None,
            per_item_bytes: None,
        }
    }

    /// Browser sync storage limits.
    pub const fn synced_default() -> Self {
        Self {
            total_bytes: Some(102_400),
            per_item_bytes: Some(8_192),
        }
    }

    /// Browser local storage limit.
    pub const fn local_default() -> Self {
        Self {
            total_bytes: Some(10_485_760),
            per_item_bytes: None,
        }
    }

    /// Rejects `incoming` if merging it into `current` would break a limit.
    pub fn check(
        &self,
        tier: Tier,
        current: &Map<String, Value>,
        incoming: &Map<String, Value>,
    ) -> StoreResult<()> {
        if let Some(limit) = self.per_item_bytes {
            for (key, value) in incoming {
                let needed = item_size(key, value)?;
                if needed > limit {
                    return Err(StoreError::QuotaExceeded { tier, needed, limit });
                }
            }
        }
        if let Some(limit) = self.total_bytes {
            let mut needed = 0;
            for (key, value) in current {
                if !incoming.contains_key(key) {
                    needed += item_size(key, value)?;
                }
            }
            for (key, value) in incoming {
                needed += item_size(key, value)?;
            }
            if needed > limit {
                return Err(StoreError::QuotaExceeded { tier, needed, limit });
            }
        }
        Ok(())
    }
}

pub(crate) fn item_size(key: &str, value: &Value) -> StoreResult<usize> {
    Ok(key.len() + serde_json::to_string(value)?.len())
}
