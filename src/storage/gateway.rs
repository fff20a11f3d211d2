//! Dual-tier persistence gateway.
//!
//! Callers name keys; the gateway routes each one to its tier and turns absent
//! keys into per-entity defaults. Size caps are applied by callers before
//! `save` and are not re-checked here. Failures are passed through unchanged
//! and never retried.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{KeyValueTier, StorageKey, Tier};
use crate::error::{StoreError, StoreResult};
use crate::models::{CacheData, HistoryEntry, ModelConfig, Prompt, Settings, SettingsDraft, UiState};

#[derive(Clone)]
pub struct StorageGateway {
    synced: Arc<dyn KeyValueTier>,
    local: Arc<dyn KeyValueTier>,
}

impl StorageGateway {
    pub fn new(synced: Arc<dyn KeyValueTier>, local: Arc<dyn KeyValueTier>) -> Self {
        Self { synced, local }
    }

    /// Raw access to one tier, used by the migration engine for legacy keys.
    pub fn tier(&self, tier: Tier) -> &dyn KeyValueTier {
        match tier {
            Tier::Synced => self.synced.as_ref(),
            Tier::Local => self.local.as_ref(),
        }
    }

    /// Loads `keys` from whichever tier each one lives in. Absent keys are omitted.
    pub async fn load(&self, keys: &[StorageKey]) -> StoreResult<Map<String, Value>> {
        let mut merged = Map::new();
        for tier in [Tier::Synced, Tier::Local] {
            let names: Vec<&str> = keys
                .iter()
                .filter(|k| k.tier() == tier)
                .map(|k| k.as_str())
                .collect();
            if names.is_empty() {
                continue;
            }
            merged.extend(self.tier(tier).get(&names).await?);
        }
        Ok(merged)
    }

    /// Loads one key, deserialized, or `None` when absent.
    pub async fn load_entry<T: DeserializeOwned>(&self, key: StorageKey) -> StoreResult<Option<T>> {
        let mut found = self.tier(key.tier()).get(&[key.as_str()]).await?;
        match found.remove(key.as_str()) {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    pub async fn load_or_default<T: DeserializeOwned + Default>(&self, key: StorageKey) -> StoreResult<T> {
        Ok(self.load_entry(key).await?.unwrap_or_default())
    }

    /// Writes `entries` to `tier`. Keys of the current schema must belong to that tier.
    #[instrument(skip(self, entries), fields(keys = entries.len()))]
    pub async fn save(&self, tier: Tier, entries: Map<String, Value>) -> StoreResult<()> {
        if let Some(misrouted) = StorageKey::ALL
            .iter()
            .find(|k| k.tier() != tier && entries.contains_key(k.as_str()))
        {
            return Err(StoreError::Validation(format!(
                "'{}' belongs to the {} tier, not {}",
                misrouted,
                misrouted.tier(),
                tier
            )));
        }
        match self.tier(tier).set(entries).await {
            Ok(()) => {
                debug!(tier = %tier, "save committed");
                Ok(())
            }
            Err(e) => {
                warn!(tier = %tier, error = %e, "save failed");
                Err(e)
            }
        }
    }

    pub async fn save_entry<T: Serialize>(&self, key: StorageKey, value: &T) -> StoreResult<()> {
        let mut entries = Map::new();
        entries.insert(key.as_str().to_string(), serde_json::to_value(value)?);
        self.save(key.tier(), entries).await
    }

    pub async fn remove(&self, keys: &[StorageKey]) -> StoreResult<()> {
        for tier in [Tier::Synced, Tier::Local] {
            let names: Vec<&str> = keys
                .iter()
                .filter(|k| k.tier() == tier)
                .map(|k| k.as_str())
                .collect();
            if !names.is_empty() {
                self.tier(tier).remove(&names).await?;
            }
        }
        Ok(())
    }

    pub async fn load_prompts(&self) -> StoreResult<Vec<Prompt>> {
        self.load_or_default(StorageKey::Prompts).await
    }

    pub async fn load_history(&self) -> StoreResult<Vec<HistoryEntry>> {
        self.load_or_default(StorageKey::History).await
    }

    pub async fn load_settings(&self) -> StoreResult<Settings> {
        self.load_or_default(StorageKey::Settings).await
    }

    pub async fn load_cache_data(&self) -> StoreResult<CacheData> {
        self.load_or_default(StorageKey::CacheData).await
    }

    pub async fn load_ui_state(&self) -> StoreResult<UiState> {
        self.load_or_default(StorageKey::UiState).await
    }

    pub async fn load_model_configs(&self) -> StoreResult<Vec<ModelConfig>> {
        self.load_or_default(StorageKey::ModelConfigs).await
    }

    pub async fn load_custom_logo(&self) -> StoreResult<Option<String>> {
        self.load_entry(StorageKey::CustomLogo).await
    }

    pub async fn load_app_title(&self) -> StoreResult<Option<String>> {
        self.load_entry(StorageKey::AppTitle).await
    }

    pub async fn load_settings_draft(&self) -> StoreResult<Option<SettingsDraft>> {
        self.load_entry(StorageKey::SettingsPageState).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTier;
    use serde_json::json;

    fn gateway() -> (Arc<MemoryTier>, Arc<MemoryTier>, StorageGateway) {
        let synced = Arc::new(MemoryTier::new(Tier::Synced));
        let local = Arc::new(MemoryTier::new(Tier::Local));
        let gateway = StorageGateway::new(synced.clone(), local.clone());
        (synced, local, gateway)
    }

    #[tokio::test]
    async fn test_missing_keys_resolve_to_defaults() {
        let (_, _, gateway) = gateway();
        assert!(gateway.load_prompts().await.unwrap().is_empty());
        assert!(gateway.load_history().await.unwrap().is_empty());
        assert_eq!(gateway.load_settings().await.unwrap(), Settings::default());
        assert_eq!(gateway.load_ui_state().await.unwrap(), UiState::default());
        assert!(gateway.load_app_title().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_entry_routes_by_key() {
        let (synced, local, gateway) = gateway();
        gateway.save_entry(StorageKey::Settings, &Settings::default()).await.unwrap();
        gateway.save_entry(StorageKey::AppTitle, &"Title").await.unwrap();

        assert!(synced.snapshot().contains_key("settings"));
        assert!(local.snapshot().contains_key("appTitle"));
        assert!(!local.snapshot().contains_key("settings"));
    }

    #[tokio::test]
    async fn test_load_merges_both_tiers() {
        let (_, _, gateway) = gateway();
        gateway.save_entry(StorageKey::Prompts, &json!([])).await.unwrap();
        gateway.save_entry(StorageKey::CustomLogo, &"data:image/png;base64,AA==").await.unwrap();

        let loaded = gateway
            .load(&[StorageKey::Prompts, StorageKey::CustomLogo, StorageKey::History])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn test_save_rejects_misrouted_key() {
        let (synced, _, gateway) = gateway();
        let mut entries = Map::new();
        entries.insert("cacheData".into(), json!({}));
        assert!(matches!(
            gateway.save(Tier::Synced, entries).await,
            Err(StoreError::Validation(_))
        ));
        assert!(synced.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_tier_is_reported_not_defaulted() {
        let (synced, _, gateway) = gateway();
        synced.set_unavailable(true);
        assert!(matches!(
            gateway.load_prompts().await,
            Err(StoreError::StorageUnavailable { tier: Tier::Synced, .. })
        ));
    }
}
