use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::storage::TierQuota;

/// Fixed limits of the store. Per-user caps live in [`crate::models::Settings`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub synced_quota: TierQuota,
    pub local_quota: TierQuota,
    pub max_model_configs: usize,
    pub draft_ttl_hours: i64,
    pub app_title_max_chars: usize,
    pub default_app_title: String,
    pub max_logo_bytes: usize,
    /// Number of entries shown by the favorites and recent views.
    pub view_limit: usize,
    pub assist_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            synced_quota: TierQuota::synced_default(),
            local_quota: TierQuota::local_default(),
            max_model_configs: 5,
            draft_ttl_hours: 24,
            app_title_max_chars: 20,
            default_app_title: "PromptCV".to_string(),
            max_logo_bytes: 1024 * 1024,
            view_limit: 20,
            assist_timeout_secs: 60,
        }
    }
}

impl StoreConfig {
    /// Same limits with both tier quotas lifted.
    pub fn without_quotas(mut self) -> Self {
        self.synced_quota = TierQuota::unlimited();
        self.local_quota = TierQuota::unlimited();
        self
    }

    pub fn draft_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.draft_ttl_hours)
    }

    pub fn assist_timeout(&self) -> Duration {
        Duration::from_secs(self.assist_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"max_model_configs": 3}"#).unwrap();
        assert_eq!(config.max_model_configs, 3);
        assert_eq!(config.draft_ttl_hours, 24);
        assert_eq!(config.synced_quota.per_item_bytes, Some(8_192));
    }
}
