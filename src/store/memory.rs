//! In-memory storage backend.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;

use super::area::{self, ChangeFeed, ChangeReceiver, Entries, StorageArea};

// ============================================================================
// MemoryStorage
// ============================================================================

/// A [`StorageArea`] that lives for the process lifetime.
#[derive(Debug)]
pub struct MemoryStorage {
    entries: RwLock<Entries>,
    feed: ChangeFeed,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_entries(Entries::new())
    }

    /// Creates a store pre-populated with `entries`.
    #[must_use]
    pub fn with_entries(entries: Entries) -> Self {
        Self {
            entries: RwLock::new(entries),
            feed: ChangeFeed::new(),
        }
    }

    /// Returns the number of stored keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no key is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl StorageArea for MemoryStorage {
    async fn get(&self, keys: &[String]) -> Result<Entries> {
        Ok(area::select(&self.entries.read(), keys))
    }

    async fn get_all(&self) -> Result<Entries> {
        Ok(self.entries.read().clone())
    }

    async fn set(&self, entries: Entries) -> Result<()> {
        let mut map = self.entries.write();
        let changes = area::apply_set(&mut map, entries);
        self.feed.emit(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut map = self.entries.write();
        let changes = area::apply_remove(&mut map, keys);
        self.feed.emit(changes);
        Ok(())
    }

    fn subscribe(&self) -> ChangeReceiver {
        self.feed.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
