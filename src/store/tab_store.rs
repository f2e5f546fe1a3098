//! Typed per-tab layout over a [`StorageArea`].
//!
//! # Key layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `<tabId>` | array of [`CaptureRecord`] |
//! | `state_<tabId>` | `true` while listening, absent otherwise |
//! | `autoRefresh` | boolean, `true` unless explicitly `false` |
//!
//! All writes to one tab's entries go through that tab's async lock, so
//! concurrent appends never lose a record.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::capture::CaptureRecord;
use crate::error::Result;
use crate::identifiers::TabId;
use crate::protocol::TabStatus;

use super::area::{Entries, StorageArea};

// ============================================================================
// Constants
// ============================================================================

/// Prefix of the listening-flag key.
pub const STATE_KEY_PREFIX: &str = "state_";

/// Key of the auto-refresh preference.
pub const AUTO_REFRESH_KEY: &str = "autoRefresh";

// ============================================================================
// Key Helpers
// ============================================================================

/// Key of a tab's log.
#[inline]
#[must_use]
pub fn log_key(tab_id: TabId) -> String {
    tab_id.to_string()
}

/// Key of a tab's listening flag.
#[inline]
#[must_use]
pub fn state_key(tab_id: TabId) -> String {
    format!("{STATE_KEY_PREFIX}{tab_id}")
}

/// Parses a log key back into its tab. Other keys return `None`.
#[must_use]
pub fn parse_log_key(key: &str) -> Option<TabId> {
    key.parse().ok()
}

/// Parses a listening-flag key back into its tab. Other keys return `None`.
#[must_use]
pub fn parse_state_key(key: &str) -> Option<TabId> {
    key.strip_prefix(STATE_KEY_PREFIX)?.parse().ok()
}

/// Returns the tab a per-tab key belongs to, whether log or flag.
fn tab_of_key(key: &str) -> Option<TabId> {
    parse_log_key(key).or_else(|| parse_state_key(key))
}

// ============================================================================
// TabStore
// ============================================================================

type TabLocks = FxHashMap<TabId, Arc<tokio::sync::Mutex<()>>>;

/// Typed access to per-tab state. Cheap to clone; clones share locks.
#[derive(Debug, Clone)]
pub struct TabStore {
    area: Arc<dyn StorageArea>,
    locks: Arc<Mutex<TabLocks>>,
}

impl TabStore {
    /// Wraps a storage area.
    #[must_use]
    pub fn new(area: Arc<dyn StorageArea>) -> Self {
        Self {
            area,
            locks: Arc::new(Mutex::new(TabLocks::default())),
        }
    }

    /// Returns the underlying storage area.
    #[inline]
    #[must_use]
    pub fn area(&self) -> &Arc<dyn StorageArea> {
        &self.area
    }

    fn tab_lock(&self, tab_id: TabId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.lock().entry(tab_id).or_default())
    }

    /// Drops the tab's lock entry. Holders of the lock keep their guard.
    pub(crate) fn forget_tab(&self, tab_id: TabId) {
        self.locks.lock().remove(&tab_id);
    }
}

// ============================================================================
// TabStore - Log
// ============================================================================

impl TabStore {
    /// Reads a tab's log in append order. Absent means empty.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn read_log(&self, tab_id: TabId) -> Result<Vec<CaptureRecord>> {
        let key = log_key(tab_id);
        let mut entries = self.area.get(std::slice::from_ref(&key)).await?;
        Ok(entries
            .remove(&key)
            .map(|value| decode_log(tab_id, value))
            .unwrap_or_default())
    }

    /// Appends a record and returns the new log length.
    ///
    /// # Errors
    ///
    /// Propagates storage failures; the log is unchanged on failure.
    pub async fn append(&self, tab_id: TabId, record: CaptureRecord) -> Result<usize> {
        self.append_with(tab_id, record, |_| {}).await
    }

    /// Appends a record, then runs `appended` with the new length while the
    /// tab's lock is still held.
    ///
    /// Writers of one tab run `appended` in the order their appends landed.
    ///
    /// # Errors
    ///
    /// Propagates storage failures; `appended` does not run on failure.
    pub async fn append_with<F>(&self, tab_id: TabId, record: CaptureRecord, appended: F) -> Result<usize>
    where
        F: FnOnce(usize),
    {
        let lock = self.tab_lock(tab_id);
        let _guard = lock.lock().await;

        let mut log = self.read_log(tab_id).await?;
        log.push(record);
        let count = log.len();

        let mut entries = Entries::new();
        entries.insert(log_key(tab_id), serde_json::to_value(&log)?);
        self.area.set(entries).await?;

        appended(count);
        Ok(count)
    }

    /// Removes a tab's log.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn clear_log(&self, tab_id: TabId) -> Result<()> {
        let lock = self.tab_lock(tab_id);
        let _guard = lock.lock().await;
        self.area.remove(&[log_key(tab_id)]).await
    }

    /// Removes a tab's log and listening flag in one mutation.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn remove_tab(&self, tab_id: TabId) -> Result<()> {
        let lock = self.tab_lock(tab_id);
        let _guard = lock.lock().await;
        self.area
            .remove(&[log_key(tab_id), state_key(tab_id)])
            .await
    }

    /// Reads every log in storage, concatenated in key order.
    ///
    /// Any array-valued key counts as a log.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn all_records(&self) -> Result<Vec<CaptureRecord>> {
        let all = self.area.get_all().await?;
        let mut records = Vec::new();
        for (key, value) in all {
            if !value.is_array() {
                continue;
            }
            match parse_log_key(&key) {
                Some(tab_id) => records.extend(decode_log(tab_id, value)),
                None => records.extend(decode_records(&key, value)),
            }
        }
        Ok(records)
    }
}

impl TabStore {
    /// Removes the log and flag of every stored tab that `is_open` rejects.
    ///
    /// Keys that belong to no tab, such as [`AUTO_REFRESH_KEY`], are kept.
    /// Returns the number of tabs reclaimed.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn remove_orphans<F>(&self, is_open: F) -> Result<usize>
    where
        F: Fn(TabId) -> bool,
    {
        let all = self.area.get_all().await?;
        let mut orphans: Vec<TabId> = all
            .keys()
            .filter_map(|key| tab_of_key(key))
            .filter(|tab_id| !is_open(*tab_id))
            .collect();
        orphans.sort_unstable();
        orphans.dedup();

        for tab_id in &orphans {
            self.remove_tab(*tab_id).await?;
            self.forget_tab(*tab_id);
        }

        if !orphans.is_empty() {
            debug!(reclaimed = orphans.len(), "Removed state of tabs no longer open");
        }
        Ok(orphans.len())
    }
}

// ============================================================================
// TabStore - Flags
// ============================================================================

impl TabStore {
    /// Returns whether capture is on for the tab.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn is_listening(&self, tab_id: TabId) -> Result<bool> {
        let key = state_key(tab_id);
        let entries = self.area.get(std::slice::from_ref(&key)).await?;
        Ok(entries.get(&key).and_then(Value::as_bool).unwrap_or(false))
    }

    /// Sets or clears the tab's listening flag.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn set_listening(&self, tab_id: TabId, listening: bool) -> Result<()> {
        let lock = self.tab_lock(tab_id);
        let _guard = lock.lock().await;

        if listening {
            let mut entries = Entries::new();
            entries.insert(state_key(tab_id), Value::Bool(true));
            self.area.set(entries).await
        } else {
            self.area.remove(&[state_key(tab_id)]).await
        }
    }

    /// Returns `{isListening, requestCount}` for the tab.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn tab_status(&self, tab_id: TabId) -> Result<TabStatus> {
        let keys = [log_key(tab_id), state_key(tab_id)];
        let mut entries = self.area.get(&keys).await?;

        let is_listening = entries
            .get(&keys[1])
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let request_count = entries
            .remove(&keys[0])
            .map(|value| decode_log(tab_id, value).len())
            .unwrap_or_default();

        Ok(TabStatus {
            is_listening,
            request_count,
        })
    }

    /// Returns the auto-refresh preference, `true` unless explicitly `false`.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn auto_refresh(&self) -> Result<bool> {
        let key = AUTO_REFRESH_KEY.to_string();
        let entries = self.area.get(std::slice::from_ref(&key)).await?;
        Ok(entries.get(&key) != Some(&Value::Bool(false)))
    }

    /// Writes the auto-refresh preference.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn set_auto_refresh(&self, enabled: bool) -> Result<()> {
        let mut entries = Entries::new();
        entries.insert(AUTO_REFRESH_KEY.to_string(), Value::Bool(enabled));
        self.area.set(entries).await
    }
}

// ============================================================================
// Decoding
// ============================================================================

fn decode_log(tab_id: TabId, value: Value) -> Vec<CaptureRecord> {
    decode_records(&log_key(tab_id), value)
}

/// Decodes a stored array, skipping entries that are not records.
fn decode_records(key: &str, value: Value) -> Vec<CaptureRecord> {
    let Value::Array(items) = value else {
        warn!(key, "Stored log is not an array, treating as empty");
        return Vec::new();
    };

    let total = items.len();
    let records: Vec<CaptureRecord> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();

    if records.len() != total {
        debug!(key, skipped = total - records.len(), "Skipped malformed stored records");
    }
    records
}

// ============================================================================
// Tests
// ============================================================================
