//! Install/update reconciliation between the synced and local tiers.
//!
//! Older releases kept prompts and history in the local tier and stored the
//! scratchpad under `cloudData` (first in the local tier, later in the synced
//! tier). The update event moves both into the current layout. Each move
//! copies first and deletes the source only after the destination write has
//! been confirmed, so an interrupted run can duplicate data but never lose it.
//! A second run against migrated data finds nothing to do.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{info, instrument, warn};

use crate::error::{StoreError, StoreResult};
use crate::models::{CacheData, HistoryEntry, Prompt, Settings};
use crate::storage::{StorageGateway, StorageKey, Tier};

/// Scratchpad key used before `cacheData` existed.
pub const LEGACY_CLOUD_DATA_KEY: &str = "cloudData";

/// Host lifecycle event that triggers the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Install,
    Update,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Install => f.write_str("install"),
            LifecycleEvent::Update => f.write_str("update"),
        }
    }
}

/// Legacy layouts the engine recognises.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyShape {
    /// Prompt and history lists stored in the local tier. `None` means the key
    /// was absent or malformed and is left where it is.
    LocalPromptLists {
        prompts: Option<Vec<Value>>,
        history: Option<Vec<Value>>,
    },
    /// Scratchpad object stored under `cloudData` in `tier`.
    CloudDisk { tier: Tier, blob: Map<String, Value> },
}

/// Observable position in the update state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Start,
    InspectLocal,
    MigrateToSync,
    InspectLocalLegacy,
    MigrateLocalLegacy,
    InspectSyncLegacy,
    MigrateToLocal,
    Done,
}

enum Step {
    Start,
    InspectLocal,
    MigrateToSync(LegacyShape),
    InspectLocalLegacy,
    MigrateLocalLegacy(LegacyShape),
    InspectSyncLegacy,
    MigrateToLocal(LegacyShape),
    Done,
}

impl Step {
    fn state(&self) -> MigrationState {
        match self {
            Step::Start => MigrationState::Start,
            Step::InspectLocal => MigrationState::InspectLocal,
            Step::MigrateToSync(_) => MigrationState::MigrateToSync,
            Step::InspectLocalLegacy => MigrationState::InspectLocalLegacy,
            Step::MigrateLocalLegacy(_) => MigrationState::MigrateLocalLegacy,
            Step::InspectSyncLegacy => MigrationState::InspectSyncLegacy,
            Step::MigrateToLocal(_) => MigrationState::MigrateToLocal,
            Step::Done => MigrationState::Done,
        }
    }
}

/// What a single engine run did.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub event: LifecycleEvent,
    pub visited: Vec<MigrationState>,
    /// Keys written by the install event.
    pub initialized: Vec<StorageKey>,
    pub migrated_prompts: usize,
    pub migrated_history: usize,
    /// Tiers whose `cloudData` was moved into `cacheData`.
    pub migrated_cloud_data: Vec<Tier>,
    /// Legacy keys that were not list/object shaped, and `key[index]` for
    /// list elements that could not be read as a record and were dropped.
    pub malformed: Vec<(Tier, String)>,
}

impl MigrationReport {
    fn new(event: LifecycleEvent) -> Self {
        Self {
            event,
            visited: Vec::new(),
            initialized: Vec::new(),
            migrated_prompts: 0,
            migrated_history: 0,
            migrated_cloud_data: Vec::new(),
            malformed: Vec::new(),
        }
    }

    /// True when the run changed nothing in storage.
    pub fn is_noop(&self) -> bool {
        self.initialized.is_empty()
            && self.migrated_cloud_data.is_empty()
            && !self.visited.contains(&MigrationState::MigrateToSync)
    }
}

pub struct MigrationEngine {
    gateway: StorageGateway,
}

impl MigrationEngine {
    pub fn new(gateway: StorageGateway) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self, event), fields(event = %event))]
    pub async fn run(&self, event: LifecycleEvent) -> StoreResult<MigrationReport> {
        let mut report = MigrationReport::new(event);
        match event {
            LifecycleEvent::Install => self.initialize(&mut report).await?,
            LifecycleEvent::Update => self.reconcile(&mut report).await?,
        }
        info!(
            prompts = report.migrated_prompts,
            history = report.migrated_history,
            cloud_data = report.migrated_cloud_data.len(),
            initialized = report.initialized.len(),
            "lifecycle migration finished"
        );
        Ok(report)
    }

    /// Writes empty defaults for every core key that is not already present.
    async fn initialize(&self, report: &mut MigrationReport) -> StoreResult<()> {
        let existing = self
            .gateway
            .load(&[StorageKey::Prompts, StorageKey::History, StorageKey::Settings, StorageKey::CacheData])
            .await?;

        let mut synced = Map::new();
        let defaults = [
            (StorageKey::Prompts, Value::Array(Vec::new())),
            (StorageKey::History, Value::Array(Vec::new())),
            (StorageKey::Settings, serde_json::to_value(Settings::default())?),
        ];
        for (key, value) in defaults {
            if !existing.contains_key(key.as_str()) {
                synced.insert(key.as_str().to_string(), value);
                report.initialized.push(key);
            }
        }
        if !synced.is_empty() {
            self.gateway.save(Tier::Synced, synced).await?;
        }

        if !existing.contains_key(StorageKey::CacheData.as_str()) {
            self.gateway
                .save_entry(StorageKey::CacheData, &CacheData::default())
                .await?;
            report.initialized.push(StorageKey::CacheData);
        }
        Ok(())
    }

    async fn reconcile(&self, report: &mut MigrationReport) -> StoreResult<()> {
        let mut step = Step::Start;
        loop {
            report.visited.push(step.state());
            step = match step {
                Step::Start => Step::InspectLocal,
                Step::InspectLocal => match self.inspect_local_lists(report).await? {
                    Some(shape) => Step::MigrateToSync(shape),
                    None => Step::InspectLocalLegacy,
                },
                Step::MigrateToSync(shape) => {
                    self.migrate_lists_to_sync(shape, report).await?;
                    Step::InspectLocalLegacy
                }
                Step::InspectLocalLegacy => match self.inspect_cloud_disk(Tier::Local, report).await? {
                    Some(shape) => Step::MigrateLocalLegacy(shape),
                    None => Step::InspectSyncLegacy,
                },
                Step::MigrateLocalLegacy(shape) => {
                    self.migrate_cloud_disk(shape, report).await?;
                    Step::InspectSyncLegacy
                }
                Step::InspectSyncLegacy => match self.inspect_cloud_disk(Tier::Synced, report).await? {
                    Some(shape) => Step::MigrateToLocal(shape),
                    None => Step::Done,
                },
                Step::MigrateToLocal(shape) => {
                    self.migrate_cloud_disk(shape, report).await?;
                    Step::Done
                }
                Step::Done => return Ok(()),
            };
        }
    }

    async fn inspect_local_lists(&self, report: &mut MigrationReport) -> StoreResult<Option<LegacyShape>> {
        let local = self.gateway.tier(Tier::Local);
        let mut found = local
            .get(&[StorageKey::Prompts.as_str(), StorageKey::History.as_str()])
            .await?;

        let mut take_list = |key: StorageKey| match found.remove(key.as_str()) {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(items),
            Some(_) => {
                let skipped = StoreError::MalformedLegacyData {
                    tier: Tier::Local,
                    key: key.as_str().to_string(),
                };
                warn!(error = %skipped, "legacy value is not a list, leaving it in place");
                report.malformed.push((Tier::Local, key.as_str().to_string()));
                None
            }
        };
        let prompts = take_list(StorageKey::Prompts);
        let history = take_list(StorageKey::History);
        let prompts = prompts.map(|items| keep_readable::<Prompt>(StorageKey::Prompts, items, report));
        let history = history.map(|items| keep_readable::<HistoryEntry>(StorageKey::History, items, report));

        let has_items = |list: &Option<Vec<Value>>| list.as_ref().map_or(false, |l| !l.is_empty());
        if has_items(&prompts) || has_items(&history) {
            Ok(Some(LegacyShape::LocalPromptLists { prompts, history }))
        } else {
            Ok(None)
        }
    }

    /// Overwrites the synced lists with the local ones, then clears the local copies.
    async fn migrate_lists_to_sync(&self, shape: LegacyShape, report: &mut MigrationReport) -> StoreResult<()> {
        let LegacyShape::LocalPromptLists { prompts, history } = shape else {
            return Err(StoreError::Validation("expected local prompt lists".to_string()));
        };

        let mut to_remove = vec![StorageKey::Settings.as_str()];
        if prompts.is_some() {
            to_remove.push(StorageKey::Prompts.as_str());
        }
        if history.is_some() {
            to_remove.push(StorageKey::History.as_str());
        }
        let prompts = prompts.unwrap_or_default();
        let history = history.unwrap_or_default();
        let (prompt_count, history_count) = (prompts.len(), history.len());

        let mut entries = Map::new();
        entries.insert(StorageKey::Prompts.as_str().to_string(), Value::Array(prompts));
        entries.insert(StorageKey::History.as_str().to_string(), Value::Array(history));
        entries.insert(
            StorageKey::Settings.as_str().to_string(),
            serde_json::to_value(Settings::default())?,
        );

        info!(prompts = prompt_count, history = history_count, "moving local prompt lists to synced tier");
        if let Err(e) = self.gateway.save(Tier::Synced, entries).await {
            warn!(error = %e, "synced write failed, local prompt lists kept for the next update");
            return Err(e);
        }

        self.gateway.tier(Tier::Local).remove(&to_remove).await?;
        report.migrated_prompts = prompt_count;
        report.migrated_history = history_count;
        Ok(())
    }

    async fn inspect_cloud_disk(&self, tier: Tier, report: &mut MigrationReport) -> StoreResult<Option<LegacyShape>> {
        let mut found = self.gateway.tier(tier).get(&[LEGACY_CLOUD_DATA_KEY]).await?;
        match found.remove(LEGACY_CLOUD_DATA_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(blob)) => Ok(Some(LegacyShape::CloudDisk { tier, blob })),
            Some(_) => {
                let skipped = StoreError::MalformedLegacyData {
                    tier,
                    key: LEGACY_CLOUD_DATA_KEY.to_string(),
                };
                warn!(error = %skipped, "legacy value is not an object, leaving it in place");
                report.malformed.push((tier, LEGACY_CLOUD_DATA_KEY.to_string()));
                Ok(None)
            }
        }
    }

    /// Copies a legacy scratchpad into local `cacheData`, then removes the source key.
    async fn migrate_cloud_disk(&self, shape: LegacyShape, report: &mut MigrationReport) -> StoreResult<()> {
        let LegacyShape::CloudDisk { tier, blob } = shape else {
            return Err(StoreError::Validation("expected a cloud disk blob".to_string()));
        };

        info!(source = %tier, "moving legacy cloudData into cacheData");
        let mut entries = Map::new();
        entries.insert(StorageKey::CacheData.as_str().to_string(), Value::Object(blob));
        if let Err(e) = self.gateway.save(Tier::Local, entries).await {
            warn!(source = %tier, error = %e, "cacheData write failed, legacy cloudData kept for the next update");
            return Err(e);
        }

        self.gateway.tier(tier).remove(&[LEGACY_CLOUD_DATA_KEY]).await?;
        report.migrated_cloud_data.push(tier);
        Ok(())
    }
}

/// Drops list elements that do not read back as `T`, recording each as `key[index]`.
fn keep_readable<T: DeserializeOwned>(key: StorageKey, items: Vec<Value>, report: &mut MigrationReport) -> Vec<Value> {
    let mut kept = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(_) => kept.push(item),
            Err(e) => {
                let label = format!("{}[{}]", key.as_str(), index);
                warn!(entry = %label, error = %e, "dropping unreadable legacy record");
                report.malformed.push((Tier::Local, label));
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTier;
    use serde_json::json;
    use std::sync::Arc;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn prompt(id: &str) -> Value {
        json!({
            "id": id,
            "app": "chatgpt",
            "content": format!("prompt {}", id),
            "isFavorite": false,
            "createdAt": "2024-05-01T10:00:00.000Z"
        })
    }

    fn engine(synced: Map<String, Value>, local: Map<String, Value>) -> (Arc<MemoryTier>, Arc<MemoryTier>, MigrationEngine) {
        let synced = Arc::new(MemoryTier::seeded(Tier::Synced, synced));
        let local = Arc::new(MemoryTier::seeded(Tier::Local, local));
        let gateway = StorageGateway::new(synced.clone(), local.clone());
        (synced, local, MigrationEngine::new(gateway))
    }

    #[tokio::test]
    async fn test_local_lists_move_to_synced() {
        let (synced, local, engine) = engine(
            Map::new(),
            object(json!({"prompts": [prompt("P1"), prompt("P2")], "history": []})),
        );

        let report = engine.run(LifecycleEvent::Update).await.unwrap();

        let synced = synced.snapshot();
        assert_eq!(synced["prompts"], json!([prompt("P1"), prompt("P2")]));
        assert_eq!(synced["history"], json!([]));
        assert_eq!(synced["settings"], json!({"maxPrompts": 20, "maxHistory": 20}));
        let local = local.snapshot();
        assert!(!local.contains_key("prompts"));
        assert!(!local.contains_key("history"));
        assert!(!local.contains_key("settings"));
        assert_eq!(report.migrated_prompts, 2);
        assert_eq!(
            report.visited,
            vec![
                MigrationState::Start,
                MigrationState::InspectLocal,
                MigrationState::MigrateToSync,
                MigrationState::InspectLocalLegacy,
                MigrationState::InspectSyncLegacy,
                MigrationState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_synced_cloud_data_moves_to_local_cache() {
        let (synced, local, engine) = engine(object(json!({"cloudData": {"content": "X"}})), Map::new());

        let report = engine.run(LifecycleEvent::Update).await.unwrap();

        assert_eq!(local.snapshot()["cacheData"], json!({"content": "X"}));
        assert!(!synced.snapshot().contains_key("cloudData"));
        assert_eq!(report.migrated_cloud_data, vec![Tier::Synced]);
    }

    #[tokio::test]
    async fn test_local_cloud_data_moves_before_synced_one() {
        let (synced, local, engine) = engine(
            object(json!({"cloudData": {"content": "newer"}})),
            object(json!({"cloudData": {"content": "older"}})),
        );

        let report = engine.run(LifecycleEvent::Update).await.unwrap();

        let local = local.snapshot();
        assert_eq!(local["cacheData"], json!({"content": "newer"}));
        assert!(!local.contains_key("cloudData"));
        assert!(!synced.snapshot().contains_key("cloudData"));
        assert_eq!(report.migrated_cloud_data, vec![Tier::Local, Tier::Synced]);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let (synced, local, engine) = engine(
            object(json!({"cloudData": {"content": "X"}})),
            object(json!({"prompts": [prompt("P1")], "history": [{"promptId": "P1", "copiedAt": "2024-05-01T10:00:00Z"}]})),
        );

        engine.run(LifecycleEvent::Update).await.unwrap();
        let synced_after_first = synced.snapshot();
        let local_after_first = local.snapshot();

        let second = engine.run(LifecycleEvent::Update).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(synced.snapshot(), synced_after_first);
        assert_eq!(local.snapshot(), local_after_first);
    }

    #[tokio::test]
    async fn test_failed_synced_write_keeps_local_lists() {
        let seeded = object(json!({"prompts": [prompt("P1")], "history": []}));
        let (synced, local, engine) = engine(Map::new(), seeded.clone());
        synced.set_read_only(true);

        let err = engine.run(LifecycleEvent::Update).await.unwrap_err();
        assert!(err.is_storage_failure());
        assert_eq!(local.snapshot(), seeded);
        assert!(synced.snapshot().is_empty());

        // Next update retries and succeeds.
        synced.set_read_only(false);
        engine.run(LifecycleEvent::Update).await.unwrap();
        assert_eq!(synced.snapshot()["prompts"], json!([prompt("P1")]));
        assert!(!local.snapshot().contains_key("prompts"));
    }

    #[tokio::test]
    async fn test_quota_rejection_aborts_without_deleting() {
        let seeded = object(json!({"prompts": [prompt("P1"), prompt("P2")]}));
        let synced = Arc::new(MemoryTier::with_quota(
            Tier::Synced,
            crate::storage::TierQuota {
                total_bytes: None,
                per_item_bytes: Some(64),
            },
        ));
        let local = Arc::new(MemoryTier::seeded(Tier::Local, seeded.clone()));
        let engine = MigrationEngine::new(StorageGateway::new(synced.clone(), local.clone()));

        assert!(matches!(
            engine.run(LifecycleEvent::Update).await,
            Err(StoreError::QuotaExceeded { tier: Tier::Synced, .. })
        ));
        assert_eq!(local.snapshot(), seeded);
    }

    #[tokio::test]
    async fn test_failed_cache_write_keeps_legacy_key() {
        let (synced, local, engine) = engine(object(json!({"cloudData": {"content": "X"}})), Map::new());
        local.set_read_only(true);

        assert!(engine.run(LifecycleEvent::Update).await.is_err());
        assert_eq!(synced.snapshot()["cloudData"], json!({"content": "X"}));
    }

    #[tokio::test]
    async fn test_malformed_legacy_values_are_skipped_and_kept() {
        let (synced, local, engine) = engine(
            object(json!({"cloudData": "not an object"})),
            object(json!({"prompts": "corrupt", "history": [{"promptId": "1", "copiedAt": "2024-05-01T10:00:00Z"}]})),
        );

        let report = engine.run(LifecycleEvent::Update).await.unwrap();

        assert_eq!(
            report.malformed,
            vec![
                (Tier::Local, "prompts".to_string()),
                (Tier::Synced, "cloudData".to_string()),
            ]
        );
        let synced = synced.snapshot();
        assert_eq!(synced["prompts"], json!([]));
        assert_eq!(synced["history"].as_array().unwrap().len(), 1);
        assert_eq!(synced["cloudData"], json!("not an object"));
        let local = local.snapshot();
        assert_eq!(local["prompts"], json!("corrupt"));
        assert!(!local.contains_key("history"));
    }

    #[tokio::test]
    async fn test_unknown_app_and_unreadable_records_on_migration() {
        let mut foreign = prompt("P2");
        foreign["app"] = json!("kimi");
        let (synced, _, engine) = engine(
            Map::new(),
            object(json!({
                "prompts": [prompt("P1"), foreign, {"id": "P3"}],
                "history": [{"promptId": "P1"}, {"promptId": "P1", "copiedAt": "2024-05-01T10:00:00Z"}]
            })),
        );

        let report = engine.run(LifecycleEvent::Update).await.unwrap();

        assert_eq!(report.migrated_prompts, 2);
        assert_eq!(report.migrated_history, 1);
        assert_eq!(
            report.malformed,
            vec![
                (Tier::Local, "prompts[2]".to_string()),
                (Tier::Local, "history[0]".to_string()),
            ]
        );
        let migrated: Vec<Prompt> = serde_json::from_value(synced.snapshot()["prompts"].clone()).unwrap();
        assert_eq!(migrated[1].app, crate::models::AppTag::Other);
    }

    #[tokio::test]
    async fn test_empty_local_lists_skip_migration() {
        let (synced, local, engine) = engine(
            object(json!({"prompts": [prompt("S1")]})),
            object(json!({"prompts": [], "history": []})),
        );

        let report = engine.run(LifecycleEvent::Update).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(synced.snapshot()["prompts"], json!([prompt("S1")]));
        assert_eq!(local.snapshot()["prompts"], json!([]));
    }

    #[tokio::test]
    async fn test_install_initializes_empty_tiers() {
        let (synced, local, engine) = engine(Map::new(), Map::new());

        let report = engine.run(LifecycleEvent::Install).await.unwrap();

        let synced = synced.snapshot();
        assert_eq!(synced["prompts"], json!([]));
        assert_eq!(synced["history"], json!([]));
        assert_eq!(synced["settings"], json!({"maxPrompts": 20, "maxHistory": 20}));
        assert_eq!(
            local.snapshot()["cacheData"],
            json!({"content": "", "files": [], "lastModified": null})
        );
        assert_eq!(report.initialized.len(), 4);
    }

    #[tokio::test]
    async fn test_repeated_install_keeps_existing_data() {
        let (synced, _, engine) = engine(object(json!({"prompts": [prompt("P1")]})), Map::new());

        let report = engine.run(LifecycleEvent::Install).await.unwrap();

        assert_eq!(synced.snapshot()["prompts"], json!([prompt("P1")]));
        assert!(!report.initialized.contains(&StorageKey::Prompts));
    }
}
