pub mod cache;
pub mod model_config;
pub mod prompt;
pub mod settings;

pub use cache::{CacheData, UiState};
pub use model_config::ModelConfig;
pub use prompt::{AppTag, HistoryEntry, Prompt};
pub use settings::{Settings, SettingsDraft};

use chrono::{DateTime, Utc};

/// Returns a time-derived id that sorts after every id in `existing`.
///
/// Ids are millisecond timestamps; when two records are created within the same
/// millisecond the later one is bumped so an id is never handed out twice.
pub fn next_id<'a>(existing: impl IntoIterator<Item = &'a str>, now: DateTime<Utc>) -> String {
    let now_ms = now.timestamp_millis().max(0) as u64;
    let highest = existing
        .into_iter()
        .filter_map(|id| id.parse::<u64>().ok())
        .max();
    match highest {
        Some(h) if h >= now_ms => (h + 1).to_string(),
        _ => now_ms.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_id_uses_clock() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        assert_eq!(next_id(std::iter::empty(), now), "1700000000000");
    }

    #[test]
    fn test_next_id_never_reuses() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let existing = ["1700000000000", "legacy-id", "1699999999999"];
        assert_eq!(next_id(existing, now), "1700000000001");
    }
}
