//! File-Backed Durable Store
//!
//! One file per key under a root directory. File names are the
//! url-encoded key, so the key can be recovered by scanning the directory
//! on startup. Writes go to a temporary file first and are renamed into
//! place, so a crash never leaves a half-written value behind.

use crate::domain::ports::DurableStore;
use crate::error::{Error, Result};
use crate::storage::validate_key;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const VALUE_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

// =============================================================================
// File Store Configuration
// =============================================================================

/// Configuration for the file store
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Directory holding one file per key
    pub root_path: PathBuf,
    /// Whether to fsync every write
    pub sync_writes: bool,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from(".thimar"),
            sync_writes: true,
        }
    }
}

// =============================================================================
// File Store
// =============================================================================

/// Durable store persisting each key as a JSON file
pub struct FileStore {
    /// Root directory
    root_path: PathBuf,
    /// Known keys
    index: RwLock<BTreeSet<String>>,
    /// Whether to sync writes
    sync_writes: bool,
}

impl FileStore {
    /// Open (or create) a store rooted at `root_path`
    pub async fn open(root_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(FileStoreConfig {
            root_path: root_path.into(),
            ..Default::default()
        })
        .await
    }

    /// Open a store with full config
    pub async fn with_config(config: FileStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root_path).await?;

        let store = Self {
            root_path: config.root_path,
            index: RwLock::new(BTreeSet::new()),
            sync_writes: config.sync_writes,
        };

        store.rebuild_index().await?;
        Ok(store)
    }

    /// Root directory of this store
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Rebuild the key index from the files on disk
    async fn rebuild_index(&self) -> Result<()> {
        let mut keys = BTreeSet::new();

        let mut entries = fs::read_dir(&self.root_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(VALUE_EXTENSION) => {}
                Some(TEMP_EXTENSION) => {
                    // Interrupted write; the previous value (if any) is intact
                    let _ = fs::remove_file(&path).await;
                    continue;
                }
                _ => continue,
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match urlencoding::decode(stem) {
                Ok(key) => {
                    keys.insert(key.into_owned());
                }
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping undecodable store file"),
            }
        }

        debug!(root = %self.root_path.display(), keys = keys.len(), "File store index rebuilt");
        *self.index.write() = keys;
        Ok(())
    }

    /// Unique scratch file for one write of `key`
    fn temp_path(&self, key: &str) -> PathBuf {
        self.root_path.join(format!(
            "{}.{}.{}",
            urlencoding::encode(key),
            Uuid::new_v4().simple(),
            TEMP_EXTENSION
        ))
    }

    /// Path of the file holding `key`
    fn value_path(&self, key: &str) -> PathBuf {
        self.root_path
            .join(format!("{}.{}", urlencoding::encode(key), VALUE_EXTENSION))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        if !self.index.read().contains(key) {
            return Ok(None);
        }

        match fs::read_to_string(self.value_path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.index.write().remove(key);
                Ok(None)
            }
            Err(e) => Err(Error::store("get", key, e)),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.value_path(key);
        let temp_path = self.temp_path(key);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::store("set", key, e))?;
        file.write_all(value.as_bytes())
            .await
            .map_err(|e| Error::store("set", key, e))?;
        if self.sync_writes {
            file.sync_all()
                .await
                .map_err(|e| Error::store("set", key, e))?;
        }
        drop(file);

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::store("set", key, e))?;

        self.index.write().insert(key.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.index.write().remove(key);

        match fs::remove_file(self.value_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::store("remove", key, e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.index.read().iter().cloned().collect())
    }

    fn store_name(&self) -> &str {
        "file"
    }
}
