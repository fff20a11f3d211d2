pub mod assist;
pub mod bounded;
pub mod config;
pub mod error;
pub mod migration;
pub mod models;
pub mod storage;

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub use crate::config::StoreConfig;
pub use crate::error::{StoreError, StoreResult};
pub use crate::migration::{LifecycleEvent, MigrationEngine, MigrationReport};
use crate::models::{
    model_config, next_id, AppTag, CacheData, HistoryEntry, ModelConfig, Prompt, Settings, SettingsDraft, UiState,
};
use crate::storage::{MemoryTier, StorageGateway, StorageKey, Tier};

/// A whole persisted value, as accepted by [`PromptCv::save_entity`].
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Prompts(Vec<Prompt>),
    History(Vec<HistoryEntry>),
    Settings(Settings),
    CacheData(CacheData),
    UiState(UiState),
    CustomLogo(String),
    AppTitle(String),
    ModelConfigs(Vec<ModelConfig>),
    SettingsDraft(SettingsDraft),
}

impl Entity {
    pub fn key(&self) -> StorageKey {
        match self {
            Entity::Prompts(_) => StorageKey::Prompts,
            Entity::History(_) => StorageKey::History,
            Entity::Settings(_) => StorageKey::Settings,
            Entity::CacheData(_) => StorageKey::CacheData,
            Entity::UiState(_) => StorageKey::UiState,
            Entity::CustomLogo(_) => StorageKey::CustomLogo,
            Entity::AppTitle(_) => StorageKey::AppTitle,
            Entity::ModelConfigs(_) => StorageKey::ModelConfigs,
            Entity::SettingsDraft(_) => StorageKey::SettingsPageState,
        }
    }
}

/// Input for [`PromptCv::add_model_config`].
#[derive(Debug, Clone, Default)]
pub struct NewModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub name: Option<String>,
}

/// The storage core as seen by UI collaborators.
///
/// Holds no collections of its own: every call fetches what it needs through
/// the gateway and writes the result back, so callers always get fresh copies.
#[derive(Clone)]
pub struct PromptCv {
    gateway: StorageGateway,
    config: StoreConfig,
}

impl PromptCv {
    pub fn new(gateway: StorageGateway, config: StoreConfig) -> Self {
        Self { gateway, config }
    }

    /// Both tiers held in memory, with the configured quotas.
    pub fn in_memory(config: StoreConfig) -> Self {
        let synced = Arc::new(MemoryTier::with_quota(Tier::Synced, config.synced_quota));
        let local = Arc::new(MemoryTier::with_quota(Tier::Local, config.local_quota));
        Self::new(StorageGateway::new(synced, local), config)
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn get_prompts(&self) -> StoreResult<Vec<Prompt>> {
        self.gateway.load_prompts().await
    }

    pub async fn get_history(&self) -> StoreResult<Vec<HistoryEntry>> {
        self.gateway.load_history().await
    }

    pub async fn get_settings(&self) -> StoreResult<Settings> {
        self.gateway.load_settings().await
    }

    pub async fn get_cache_data(&self) -> StoreResult<CacheData> {
        self.gateway.load_cache_data().await
    }

    pub async fn get_model_configs(&self) -> StoreResult<Vec<ModelConfig>> {
        self.gateway.load_model_configs().await
    }

    pub async fn get_ui_state(&self) -> StoreResult<UiState> {
        self.gateway.load_ui_state().await
    }

    pub async fn get_app_title(&self) -> StoreResult<String> {
        Ok(self
            .gateway
            .load_app_title()
            .await?
            .unwrap_or_else(|| self.config.default_app_title.clone()))
    }

    pub async fn get_custom_logo(&self) -> StoreResult<Option<String>> {
        self.gateway.load_custom_logo().await
    }

    /// Applies the entity's size policy and writes it to its tier.
    #[instrument(skip(self, entity), fields(key = %entity.key()))]
    pub async fn save_entity(&self, entity: Entity) -> StoreResult<()> {
        let key = entity.key();
        match entity {
            Entity::Prompts(mut prompts) => {
                let settings = self.get_settings().await?;
                bounded::enforce_cap(&mut prompts, settings.max_prompts);
                self.gateway.save_entry(key, &prompts).await
            }
            Entity::History(mut history) => {
                let settings = self.get_settings().await?;
                bounded::enforce_cap(&mut history, settings.max_history);
                self.gateway.save_entry(key, &history).await
            }
            Entity::Settings(settings) => {
                if settings.max_prompts == 0 || settings.max_history == 0 {
                    return Err(StoreError::Validation("caps must be at least 1".to_string()));
                }
                self.gateway.save_entry(key, &settings).await
            }
            Entity::ModelConfigs(configs) => {
                if configs.len() > self.config.max_model_configs {
                    return Err(StoreError::CapacityReached {
                        kind: "model config",
                        max: self.config.max_model_configs,
                    });
                }
                if configs.iter().filter(|c| c.active).count() > 1 {
                    return Err(StoreError::Validation(
                        "at most one model config may be active".to_string(),
                    ));
                }
                self.gateway.save_entry(key, &configs).await
            }
            Entity::AppTitle(title) => {
                let title = self.normalize_title(&title);
                self.gateway.save_entry(key, &title).await
            }
            Entity::CustomLogo(data_uri) => {
                validate_logo(&data_uri, self.config.max_logo_bytes)?;
                self.gateway.save_entry(key, &data_uri).await
            }
            Entity::CacheData(mut cache) => {
                cache.last_modified = Some(Utc::now());
                self.gateway.save_entry(key, &cache).await
            }
            Entity::UiState(ui) => self.gateway.save_entry(key, &ui).await,
            Entity::SettingsDraft(draft) => self.gateway.save_entry(key, &draft).await,
        }
    }

    /// Entry point for the host's install/update notification.
    pub async fn run_migration_if_needed(&self, event: LifecycleEvent) -> StoreResult<MigrationReport> {
        MigrationEngine::new(self.gateway.clone()).run(event).await
    }

    // --- Prompts ---

    pub async fn add_prompt(&self, app: AppTag, content: &str) -> StoreResult<Prompt> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::Validation("prompt content is empty".to_string()));
        }
        let settings = self.get_settings().await?;
        let prompts = self.get_prompts().await?;

        let now = Utc::now();
        let id = next_id(prompts.iter().map(|p| p.id.as_str()), now);
        let prompt = Prompt::new(id, app, content.to_string(), now);
        let prompts = bounded::insert_front(prompts, prompt.clone(), settings.max_prompts);

        self.gateway.save_entry(StorageKey::Prompts, &prompts).await?;
        info!(id = %prompt.id, app = %prompt.app, "prompt saved");
        Ok(prompt)
    }

    /// Flips the favorite flag and returns the new value.
    pub async fn toggle_favorite(&self, id: &str) -> StoreResult<bool> {
        let mut prompts = self.get_prompts().await?;
        let prompt = prompts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("prompt", id))?;
        prompt.is_favorite = !prompt.is_favorite;
        let is_favorite = prompt.is_favorite;
        self.gateway.save_entry(StorageKey::Prompts, &prompts).await?;
        Ok(is_favorite)
    }

    /// Replaces a prompt's content in place. Id, app, favorite flag, creation
    /// time and list position are unchanged.
    pub async fn edit_prompt(&self, id: &str, content: &str) -> StoreResult<Prompt> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::Validation("prompt content is empty".to_string()));
        }
        let mut prompts = self.get_prompts().await?;
        let prompt = prompts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("prompt", id))?;
        prompt.content = content.to_string();
        let edited = prompt.clone();
        self.gateway.save_entry(StorageKey::Prompts, &prompts).await?;
        debug!(id = %id, "prompt edited");
        Ok(edited)
    }

    /// Removes a prompt. History entries that reference it are kept and skipped when viewed.
    pub async fn delete_prompt(&self, id: &str) -> StoreResult<Prompt> {
        let mut prompts = self.get_prompts().await?;
        let index = prompts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| not_found("prompt", id))?;
        let removed = prompts.remove(index);
        self.gateway.save_entry(StorageKey::Prompts, &prompts).await?;
        debug!(id = %id, "prompt deleted");
        Ok(removed)
    }

    /// Favorite prompts in storage order.
    pub async fn favorites(&self) -> StoreResult<Vec<Prompt>> {
        Ok(self
            .get_prompts()
            .await?
            .into_iter()
            .filter(|p| p.is_favorite)
            .take(self.config.view_limit)
            .collect())
    }

    /// Prompts ordered by `createdAt`, newest first. The sort is stable, so
    /// equal timestamps keep storage order and match the eviction order.
    pub async fn prompts_by_recency(&self) -> StoreResult<Vec<Prompt>> {
        let mut prompts = self.get_prompts().await?;
        prompts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        prompts.truncate(self.config.view_limit);
        Ok(prompts)
    }

    // --- History ---

    pub async fn record_copy(&self, prompt_id: &str) -> StoreResult<HistoryEntry> {
        let prompts = self.get_prompts().await?;
        if !prompts.iter().any(|p| p.id == prompt_id) {
            return Err(not_found("prompt", prompt_id));
        }
        let settings = self.get_settings().await?;
        let entry = HistoryEntry {
            prompt_id: prompt_id.to_string(),
            copied_at: Utc::now(),
        };
        let history = bounded::insert_front(self.get_history().await?, entry.clone(), settings.max_history);
        self.gateway.save_entry(StorageKey::History, &history).await?;
        Ok(entry)
    }

    /// History joined with prompts. Entries whose prompt is gone are skipped.
    pub async fn history_view(&self) -> StoreResult<Vec<(HistoryEntry, Prompt)>> {
        let prompts = self.get_prompts().await?;
        Ok(self
            .get_history()
            .await?
            .into_iter()
            .filter_map(|entry| {
                let prompt = prompts.iter().find(|p| p.id == entry.prompt_id)?.clone();
                Some((entry, prompt))
            })
            .collect())
    }

    // --- Cache disk and UI ---

    pub async fn save_cache_content(&self, content: String) -> StoreResult<CacheData> {
        let mut cache = self.get_cache_data().await?;
        cache.touch(content, Utc::now());
        self.gateway.save_entry(StorageKey::CacheData, &cache).await?;
        Ok(cache)
    }

    pub async fn save_ui_state(&self, ui: UiState) -> StoreResult<()> {
        self.save_entity(Entity::UiState(ui)).await
    }

    /// Stores the title after trimming and truncation; returns what was stored.
    pub async fn set_app_title(&self, title: &str) -> StoreResult<String> {
        let title = self.normalize_title(title);
        self.gateway.save_entry(StorageKey::AppTitle, &title).await?;
        Ok(title)
    }

    pub async fn set_custom_logo(&self, data_uri: String) -> StoreResult<()> {
        self.save_entity(Entity::CustomLogo(data_uri)).await
    }

    fn normalize_title(&self, title: &str) -> String {
        let title: String = title.trim().chars().take(self.config.app_title_max_chars).collect();
        let title = title.trim_end().to_string();
        if title.is_empty() {
            self.config.default_app_title.clone()
        } else {
            title
        }
    }

    // --- Model configs ---

    /// Appends an inactive config. Rejected, not evicted, once the cap is reached.
    pub async fn add_model_config(&self, input: NewModelConfig) -> StoreResult<ModelConfig> {
        let base_url = input.base_url.trim();
        let api_key = input.api_key.trim();
        let model_name = input.model_name.trim();
        if base_url.is_empty() || api_key.is_empty() || model_name.is_empty() {
            return Err(StoreError::Validation(
                "base URL, API key and model name are required".to_string(),
            ));
        }

        let mut configs = self.get_model_configs().await?;
        let now = Utc::now();
        let name = input
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Model {}", configs.len() + 1));
        let config = ModelConfig {
            id: next_id(configs.iter().map(|c| c.id.as_str()), now),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model_name: model_name.to_string(),
            name,
            active: false,
            created_at: now,
        };

        if let Err(e) = bounded::push_back_or_reject(
            &mut configs,
            config.clone(),
            self.config.max_model_configs,
            "model config",
        ) {
            warn!(max = self.config.max_model_configs, "model config rejected, collection full");
            return Err(e);
        }
        self.gateway.save_entry(StorageKey::ModelConfigs, &configs).await?;
        // A saved config supersedes any half-filled form.
        self.clear_settings_draft().await?;
        Ok(config)
    }

    /// Activates `index` (deactivating the rest), or deactivates it if it was active.
    pub async fn toggle_model(&self, index: usize) -> StoreResult<Vec<ModelConfig>> {
        let mut configs = self.get_model_configs().await?;
        model_config::toggle_active(&mut configs, index)?;
        self.gateway.save_entry(StorageKey::ModelConfigs, &configs).await?;
        Ok(configs)
    }

    pub async fn delete_model(&self, index: usize) -> StoreResult<ModelConfig> {
        let mut configs = self.get_model_configs().await?;
        if index >= configs.len() {
            return Err(not_found("model config", &index.to_string()));
        }
        let removed = configs.remove(index);
        self.gateway.save_entry(StorageKey::ModelConfigs, &configs).await?;
        Ok(removed)
    }

    pub async fn active_model(&self) -> StoreResult<Option<ModelConfig>> {
        Ok(model_config::active(&self.get_model_configs().await?).cloned())
    }

    // --- Settings page draft ---

    pub async fn save_settings_draft(&self, mut draft: SettingsDraft) -> StoreResult<()> {
        draft.timestamp = Some(Utc::now());
        self.gateway.save_entry(StorageKey::SettingsPageState, &draft).await
    }

    /// Returns the draft if it is younger than the TTL; stale drafts are removed.
    pub async fn restore_settings_draft(&self) -> StoreResult<Option<SettingsDraft>> {
        let Some(draft) = self.gateway.load_settings_draft().await? else {
            return Ok(None);
        };
        if draft.is_expired(Utc::now(), self.config.draft_ttl()) {
            debug!("discarding expired settings draft");
            self.clear_settings_draft().await?;
            return Ok(None);
        }
        Ok(Some(draft))
    }

    pub async fn clear_settings_draft(&self) -> StoreResult<()> {
        self.gateway.remove(&[StorageKey::SettingsPageState]).await
    }
}

fn not_found(kind: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

/// Accepts `data:image/<type>;base64,<payload>` whose decoded size fits `max_bytes`.
fn validate_logo(data_uri: &str, max_bytes: usize) -> StoreResult<()> {
    let rest = data_uri
        .strip_prefix("data:image/")
        .ok_or_else(|| StoreError::Validation("logo must be an image data URI".to_string()))?;
    let (_, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| StoreError::Validation("logo must be base64 encoded".to_string()))?;
    let padding = payload.chars().rev().take_while(|c| *c == '=').count();
    let decoded = (payload.len() / 4 * 3).saturating_sub(padding);
    if decoded > max_bytes {
        return Err(StoreError::Validation(format!(
            "logo is {} bytes, maximum is {}",
            decoded, max_bytes
        )));
    }
    Ok(())
}
