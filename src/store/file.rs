//! Durable storage backend: one JSON file.
//!
//! Each mutation writes the whole namespace to a temporary file in the
//! target directory and atomically renames it over the old one. The
//! in-memory view is swapped only after the rename succeeds, so a failed
//! write leaves both the file and the view untouched.

// ============================================================================
// Imports
// ============================================================================

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::area::{self, ChangeFeed, ChangeReceiver, Entries, StorageArea, StorageChange};

// ============================================================================
// FileStorage
// ============================================================================

/// A [`StorageArea`] persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<Entries>,
    /// Serializes read-modify-write cycles.
    flush: Mutex<()>,
    feed: ChangeFeed,
}

impl FileStorage {
    /// Opens the store at `path`, creating it empty if absent.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file exists but cannot be read
    /// - [`Error::Storage`] if it does not hold a JSON object
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Entries::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(Error::storage(format!(
                        "{} does not hold a JSON object",
                        path.display()
                    )));
                }
                Err(e) => {
                    return Err(Error::storage(format!(
                        "{} is not valid JSON: {e}",
                        path.display()
                    )));
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = entries.len(), "File storage opened");

        Ok(Self {
            path,
            cache: RwLock::new(entries),
            flush: Mutex::new(()),
            feed: ChangeFeed::new(),
        })
    }

    /// Returns the backing file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `mutate` to a copy of the view, persists it, then swaps it in.
    async fn commit<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Entries) -> Vec<StorageChange> + Send,
    {
        let _flush = self.flush.lock().await;

        let mut next = self.cache.read().clone();
        let changes = mutate(&mut next);
        if changes.is_empty() {
            return Ok(());
        }

        let bytes = serde_json::to_vec(&next)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| Error::storage(format!("storage writer failed: {e}")))?
            .inspect_err(|e| warn!(path = %self.path.display(), error = %e, "Storage write failed"))?;

        *self.cache.write() = next;
        self.feed.emit(changes);
        Ok(())
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl StorageArea for FileStorage {
    async fn get(&self, keys: &[String]) -> Result<Entries> {
        Ok(area::select(&self.cache.read(), keys))
    }

    async fn get_all(&self) -> Result<Entries> {
        Ok(self.cache.read().clone())
    }

    async fn set(&self, entries: Entries) -> Result<()> {
        self.commit(move |map| area::apply_set(map, entries)).await
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let keys = keys.to_vec();
        self.commit(move |map| area::apply_remove(map, &keys)).await
    }

    fn subscribe(&self) -> ChangeReceiver {
        self.feed.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
