use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_PROMPTS: usize = 20;
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// User-tunable caps, stored in the synced tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_max_prompts")]
    pub max_prompts: usize,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_enabled: Option<bool>,
}

fn default_max_prompts() -> usize {
    DEFAULT_MAX_PROMPTS
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_prompts: DEFAULT_MAX_PROMPTS,
            max_history: DEFAULT_MAX_HISTORY,
            sync_enabled: None,
        }
    }
}

/// Unsaved model-config form contents, kept across settings page reloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsDraft {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub config_name: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl SettingsDraft {
    /// A draft without a timestamp counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.timestamp {
            Some(saved_at) => now - saved_at >= ttl,
            None => true,
        }
    }
}
