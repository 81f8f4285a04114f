//! Durable relay definitions, one JSON object keyed by source channel id.

use super::error::Result;
use super::types::PersistedRecord;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Saved relays: source channel id -> record
pub type RecordMap = BTreeMap<String, PersistedRecord>;

/// File-backed store for relay records
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. Missing or malformed files yield an empty map;
    /// a missing file is created with an empty object.
    pub fn load(&self) -> RecordMap {
        if !self.path.exists() {
            if let Err(e) = self.save(&RecordMap::new()) {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to create relay state file");
            }
            return RecordMap::new();
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read relay state file");
                return RecordMap::new();
            }
        };

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "relay state file is malformed, starting empty");
                return RecordMap::new();
            }
        };

        // One bad record should not discard the rest
        raw.into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<PersistedRecord>(value) {
                Ok(record) => Some((key, record)),
                Err(e) => {
                    tracing::warn!(source_id = %key, error = %e, "skipping malformed relay record");
                    None
                }
            })
            .collect()
    }

    /// Rewrite the whole file with `records`
    pub fn save(&self, records: &RecordMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(records)?;

        // Write to a sibling temp file, then rename over the target
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::types::{RelayMode, WebhookCredential};
    use chrono::Utc;
    use tempfile::tempdir;

    fn record(source: &str, target: &str, mode: RelayMode) -> PersistedRecord {
        PersistedRecord {
            source_id: source.to_string(),
            target_id: target.to_string(),
            mode,
            webhook_credential: match mode {
                RelayMode::WebhookProxy => Some(WebhookCredential::new("900", "tok")),
                RelayMode::Direct => None,
            },
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_load_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("mirror_config.json");
        let store = ConfigStore::new(&path);

        assert!(store.load().is_empty());
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[test]
    fn test_malformed_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("state.json"));

        let mut records = RecordMap::new();
        records.insert("A".to_string(), record("A", "B", RelayMode::WebhookProxy));
        records.insert("C".to_string(), record("C", "D", RelayMode::Direct));
        store.save(&records).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, records);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_bad_record_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{
                "1": {"sourceId": "1", "targetId": "2", "mode": "direct", "startTime": "2024-01-01T00:00:00Z"},
                "3": {"sourceId": "3", "mode": "teleport"}
            }"#,
        )
        .unwrap();

        let loaded = ConfigStore::new(&path).load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["1"].target_id, "2");
    }
}
