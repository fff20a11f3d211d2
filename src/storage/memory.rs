use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

use super::{KeyValueTier, Tier, TierQuota};
use crate::error::{StoreError, StoreResult};

/// In-memory tier.
///
/// Used as the backing store in tests and for throwaway sessions. Faults can be
/// injected to exercise failure paths: `set_unavailable` fails every call,
/// `set_read_only` fails only writes and removals.
#[derive(Debug)]
pub struct MemoryTier {
    tier: Tier,
    quota: TierQuota,
    entries: Mutex<Map<String, Value>>,
    unavailable: AtomicBool,
    read_only: AtomicBool,
}

impl MemoryTier {
    pub fn new(tier: Tier) -> Self {
        Self::with_quota(tier, TierQuota::unlimited())
    }

    pub fn with_quota(tier: Tier, quota: TierQuota) -> Self {
        Self {
            tier,
            quota,
            entries: Mutex::new(Map::new()),
            unavailable: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
        }
    }

    /// Seeds the tier with `entries`, bypassing quota checks.
    pub fn seeded(tier: Tier, entries: Map<String, Value>) -> Self {
        let store = Self::new(tier);
        if let Ok(mut guard) = store.entries.lock() {
            *guard = entries;
        }
        store
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Copy of everything currently stored.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(self.tier, "store is offline"));
        }
        Ok(())
    }

    fn check_writable(&self) -> StoreResult<()> {
        self.check_available()?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(self.tier, "store rejected the write"));
        }
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Map<String, Value>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::unavailable(self.tier, "store lock poisoned"))
    }
}

#[async_trait]
impl KeyValueTier for MemoryTier {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn get(&self, keys: &[&str]) -> StoreResult<Map<String, Value>> {
        self.check_available()?;
        let entries = self.lock()?;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, incoming: Map<String, Value>) -> StoreResult<()> {
        self.check_writable()?;
        let mut entries = self.lock()?;
        self.quota.check(self.tier, &entries, &incoming)?;
        debug!(tier = %self.tier, keys = incoming.len(), "memory tier write");
        entries.extend(incoming);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        self.check_writable()?;
        let mut entries = self.lock()?;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}
