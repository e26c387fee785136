use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::DurableStore;
use crate::error::{SessionError, SessionResult};

/// Session file name in the data directory
pub const SESSION_FILE: &str = "session.json";

/// Stores all keys as one pretty-printed JSON object on disk.
///
/// The whole file is rewritten on every change; writes are serialized so two
/// read-modify-write cycles never interleave.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> SessionResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| SessionError::storage("Failed to read session file", e))?;
        serde_json::from_str(&contents)
            .map_err(|e| SessionError::storage("Failed to parse session file", e))
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> SessionResult<()> {
        if map.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)
                    .map_err(|e| SessionError::storage("Failed to remove session file", e))?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SessionError::storage("Failed to create data directory", e))?;
        }
        let contents = serde_json::to_string_pretty(map)
            .map_err(|e| SessionError::storage("Failed to encode session file", e))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| SessionError::storage("Failed to write session file", e))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get(&self, key: &str) -> SessionResult<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> SessionResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)?;
        debug!(key, path = %self.path.display(), "Stored value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> SessionResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}
