use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scratchpad ("cache disk") payload. `content` is rich-text markup and is
/// never interpreted here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheData {
    pub content: String,
    pub files: Vec<serde_json::Value>, // attachment descriptors, passed through
    pub last_modified: Option<DateTime<Utc>>,
}

impl CacheData {
    pub fn touch(&mut self, content: String, now: DateTime<Utc>) {
        self.content = content;
        self.last_modified = Some(now);
    }
}

/// Popup presentation state. Fields missing from storage keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UiState {
    pub active_tab: String,
    pub font_color: String,
    pub bg_color: String,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            active_tab: "favorites".to_string(),
            font_color: "#000000".to_string(),
            bg_color: "#FFFFFF".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_state_merges_over_defaults() {
        let ui: UiState = serde_json::from_str(r#"{"activeTab":"all"}"#).unwrap();
        assert_eq!(ui.active_tab, "all");
        assert_eq!(ui.font_color, "#000000");
        assert_eq!(ui.bg_color, "#FFFFFF");
    }

    #[test]
    fn test_cache_data_accepts_null_last_modified() {
        let cache: CacheData =
            serde_json::from_str(r#"{"content":"","files":[],"lastModified":null}"#).unwrap();
        assert_eq!(cache, CacheData::default());
    }
}
