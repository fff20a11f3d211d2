use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::{KeyValueTier, Tier, TierQuota};
use crate::error::{StoreError, StoreResult};

/// Tier backed by a directory holding one `<key>.json` file per key.
#[derive(Debug)]
pub struct FileSystemTier {
    tier: Tier,
    dir: PathBuf,
    quota: TierQuota,
    // Serializes writers within this process; the quota check reads the whole directory.
    write_lock: Mutex<()>,
}

impl FileSystemTier {
    /// Creates the tier rooted at `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(tier: Tier, dir: P, quota: TierQuota) -> Self {
        let path_buf = dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&path_buf) {
            error!(tier = %tier, path = %path_buf.display(), error = %e, "Failed to create tier directory during initialization");
        }
        Self {
            tier,
            dir: path_buf,
            quota,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn io_error(&self, action: &str, path: &Path, e: std::io::Error) -> StoreError {
        StoreError::unavailable(
            self.tier,
            format!("failed to {} '{}': {}", action, path.display(), e),
        )
    }

    async fn read_key(&self, key: &str) -> StoreResult<Option<Value>> {
        let path = self.key_path(key);
        match fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).map(Some).map_err(|e| {
                StoreError::unavailable(
                    self.tier,
                    format!("corrupt entry '{}': {}", path.display(), e),
                )
            }),
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error("read", &path, e)),
        }
    }

    async fn read_all(&self) -> StoreResult<Map<String, Value>> {
        let mut entries = Map::new();
        let mut read_dir = match fs::read_dir(&self.dir).await {
            Ok(read_dir) => read_dir,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(self.io_error("list", &self.dir, e)),
        };

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| self.io_error("list", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    match self.read_key(stem).await {
                        Ok(Some(value)) => {
                            entries.insert(stem.to_string(), value);
                        }
                        Ok(None) => {}
                        Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable entry during quota scan"),
                    }
                }
            }
        }
        Ok(entries)
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", key))
    }

    async fn write_tmp(&self, key: &str, contents: &[u8]) -> StoreResult<PathBuf> {
        let tmp_path = self.tmp_path(key);
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| self.io_error("create", &tmp_path, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| self.io_error("write", &tmp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| self.io_error("sync", &tmp_path, e))?;
        Ok(tmp_path)
    }

    /// Current bytes of `key`, `None` when absent.
    async fn read_raw(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.key_path(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error("read", &path, e)),
        }
    }

    async fn discard(&self, tmp_paths: &[PathBuf]) {
        for tmp_path in tmp_paths {
            if let Err(e) = fs::remove_file(tmp_path).await {
                warn!(path = %tmp_path.display(), error = %e, "Failed to remove staged file");
            }
        }
    }

    /// Puts back what `key` held before this write.
    async fn restore(&self, key: &str, previous: &Option<Vec<u8>>) -> StoreResult<()> {
        match previous {
            Some(bytes) => {
                let tmp_path = self.write_tmp(key, bytes).await?;
                let path = self.key_path(key);
                fs::rename(&tmp_path, &path)
                    .await
                    .map_err(|e| self.io_error("rename", &path, e))
            }
            None => {
                let path = self.key_path(key);
                fs::remove_file(&path)
                    .await
                    .map_err(|e| self.io_error("delete", &path, e))
            }
        }
    }

    /// Stages every entry, then renames them into place. A failed rename
    /// rolls back the keys already committed.
    async fn write_all(&self, entries: &Map<String, Value>) -> StoreResult<()> {
        let mut previous = Vec::with_capacity(entries.len());
        for key in entries.keys() {
            previous.push(self.read_raw(key).await?);
        }

        let mut staged = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let staged_file = match serde_json::to_vec_pretty(value) {
                Ok(contents) => self.write_tmp(key, &contents).await,
                Err(e) => Err(e.into()),
            };
            match staged_file {
                Ok(tmp_path) => staged.push(tmp_path),
                Err(e) => {
                    self.discard(&staged).await;
                    return Err(e);
                }
            }
        }

        let keys: Vec<&String> = entries.keys().collect();
        for (i, tmp_path) in staged.iter().enumerate() {
            let path = self.key_path(keys[i]);
            if let Err(e) = fs::rename(tmp_path, &path).await {
                let err = self.io_error("rename", &path, e);
                error!(tier = %self.tier, key = %keys[i], error = %err, "Commit failed, rolling back");
                for (key, prior) in keys.iter().zip(&previous).take(i) {
                    if let Err(restore_err) = self.restore(key, prior).await {
                        error!(tier = %self.tier, key = %key, error = %restore_err, "Rollback failed");
                    }
                }
                self.discard(&staged[i..]).await;
                return Err(err);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueTier for FileSystemTier {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn get(&self, keys: &[&str]) -> StoreResult<Map<String, Value>> {
        let mut found = Map::new();
        for key in keys {
            if let Some(value) = self.read_key(key).await? {
                found.insert(key.to_string(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, entries: Map<String, Value>) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        if self.quota != TierQuota::unlimited() {
            let current = self.read_all().await?;
            self.quota.check(self.tier, &current, &entries)?;
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.io_error("create directory", &self.dir, e))?;
        self.write_all(&entries).await?;
        debug!(tier = %self.tier, keys = entries.len(), "filesystem tier write");
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        for key in keys {
            let path = self.key_path(key);
            match fs::remove_file(&path).await {
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(self.io_error("delete", &path, e)),
            }
        }
        Ok(())
    }
}
