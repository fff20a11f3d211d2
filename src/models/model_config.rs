use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Connection profile for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub id: String,
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ModelConfig {
    /// API key with everything but the first and last four characters hidden.
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() < 8 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}****{}", head, tail)
    }

    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty()
            && !self.api_key.trim().is_empty()
            && !self.model_name.trim().is_empty()
    }
}

/// Flips `configs[index]`: every entry is deactivated first, then the target is
/// activated only if it was inactive before. At most one entry stays active.
pub fn toggle_active(configs: &mut [ModelConfig], index: usize) -> StoreResult<()> {
    let was_active = configs
        .get(index)
        .map(|c| c.active)
        .ok_or_else(|| StoreError::NotFound {
            kind: "model config",
            id: index.to_string(),
        })?;
    for config in configs.iter_mut() {
        config.active = false;
    }
    if !was_active {
        configs[index].active = true;
    }
    Ok(())
}

pub fn active(configs: &[ModelConfig]) -> Option<&ModelConfig> {
    configs.iter().find(|c| c.active)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, active: bool) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            base_url: "https://api.example.com/v1".to_string(),
            api_key: "sk-1234567890abcd".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            name: format!("Model {}", id),
            active,
            created_at: Utc::now(),
        }
    }

    fn active_count(configs: &[ModelConfig]) -> usize {
        configs.iter().filter(|c| c.active).count()
    }

    #[test]
    fn test_toggle_sequence_keeps_single_active() {
        let mut configs: Vec<ModelConfig> = (0..5).map(|i| config(&i.to_string(), false)).collect();
        for index in [0, 3, 3, 1, 4, 4, 4, 2, 0, 1] {
            toggle_active(&mut configs, index).unwrap();
            assert!(active_count(&configs) <= 1);
        }
    }

    #[test]
    fn test_toggle_active_entry_turns_it_off() {
        let mut configs = vec![config("a", false), config("b", true)];
        toggle_active(&mut configs, 1).unwrap();
        assert_eq!(active_count(&configs), 0);

        toggle_active(&mut configs, 0).unwrap();
        assert_eq!(active(&configs).map(|c| c.id.as_str()), Some("a"));
    }

    #[test]
    fn test_toggle_repairs_multiple_active() {
        let mut configs = vec![config("a", true), config("b", true), config("c", false)];
        toggle_active(&mut configs, 2).unwrap();
        assert_eq!(active_count(&configs), 1);
        assert!(configs[2].active);
    }

    #[test]
    fn test_toggle_out_of_range() {
        let mut configs = vec![config("a", false)];
        assert!(matches!(
            toggle_active(&mut configs, 3),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_masked_api_key() {
        assert_eq!(config("a", false).masked_api_key(), "sk-1****abcd");
        let mut short = config("b", false);
        short.api_key = "abc".to_string();
        assert_eq!(short.masked_api_key(), "****");
        short.api_key = "abcdefgh".to_string();
        assert_eq!(short.masked_api_key(), "abcd****efgh");
        short.api_key = "abcdefg".to_string();
        assert_eq!(short.masked_api_key(), "****");
    }
}
