//! Persisted key/value namespace.
//!
//! A [`StorageArea`] is an asynchronous JSON key/value store with a change
//! feed. Every mutation is all-or-nothing: either every key of a `set` or
//! `remove` takes effect, or none does and an error is returned.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Debug;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// A set of key/value pairs.
pub type Entries = Map<String, Value>;

/// One subscriber's queue of change batches.
pub type ChangeReceiver = mpsc::UnboundedReceiver<Vec<StorageChange>>;

/// One key's change within a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    /// The changed key.
    pub key: String,
    /// Value before the mutation, `None` if the key was absent.
    pub old_value: Option<Value>,
    /// Value after the mutation, `None` if the key was removed.
    pub new_value: Option<Value>,
}

impl StorageChange {
    /// Returns `true` if the key was removed.
    #[inline]
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.new_value.is_none()
    }
}

// ============================================================================
// StorageArea
// ============================================================================

/// An asynchronous persisted key/value namespace.
#[async_trait]
pub trait StorageArea: Send + Sync + Debug {
    /// Reads the given keys. Absent keys are omitted from the result.
    async fn get(&self, keys: &[String]) -> Result<Entries>;

    /// Reads every key.
    async fn get_all(&self) -> Result<Entries>;

    /// Writes every entry in one mutation.
    async fn set(&self, entries: Entries) -> Result<()>;

    /// Removes every key in one mutation. Absent keys are ignored.
    async fn remove(&self, keys: &[String]) -> Result<()>;

    /// Subscribes to change batches, one batch per effective mutation.
    ///
    /// Every batch emitted after the call is queued for the subscriber.
    fn subscribe(&self) -> ChangeReceiver;
}

// ============================================================================
// ChangeFeed
// ============================================================================

/// Change batch fan-out shared by the storage backends.
///
/// Each subscriber owns an unbounded queue, so a slow subscriber never
/// loses a batch.
#[derive(Debug, Default)]
pub(crate) struct ChangeFeed {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Vec<StorageChange>>>>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self) -> ChangeReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Emits a batch. Empty batches are dropped, as are subscribers whose
    /// receiver is gone.
    pub(crate) fn emit(&self, changes: Vec<StorageChange>) {
        if changes.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(changes.clone()).is_ok());
        if subscribers.is_empty() {
            trace!(keys = changes.len(), "Storage change had no listeners");
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

// ============================================================================
// Mutation Helpers
// ============================================================================

/// Applies `entries` to `map`, returning the effective changes.
pub(crate) fn apply_set(map: &mut Entries, entries: Entries) -> Vec<StorageChange> {
    let mut changes = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let old_value = map.insert(key.clone(), value.clone());
        if old_value.as_ref() != Some(&value) {
            changes.push(StorageChange {
                key,
                old_value,
                new_value: Some(value),
            });
        }
    }
    changes
}

/// Removes `keys` from `map`, returning the effective changes.
pub(crate) fn apply_remove(map: &mut Entries, keys: &[String]) -> Vec<StorageChange> {
    keys.iter()
        .filter_map(|key| {
            map.remove(key).map(|old| StorageChange {
                key: key.clone(),
                old_value: Some(old),
                new_value: None,
            })
        })
        .collect()
}

/// Selects `keys` from `map`.
pub(crate) fn select(map: &Entries, keys: &[String]) -> Entries {
    keys.iter()
        .filter_map(|key| map.get(key).map(|v| (key.clone(), v.clone())))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn entries(value: Value) -> Entries {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_apply_set_skips_unchanged() {
        let mut map = entries(json!({ "a": 1 }));
        let changes = apply_set(&mut map, entries(json!({ "a": 1, "b": 2 })));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "b");
        assert_eq!(changes[0].old_value, None);
    }

    #[test]
    fn test_apply_remove_ignores_absent() {
        let mut map = entries(json!({ "a": 1 }));
        let changes = apply_remove(&mut map, &["a".to_string(), "zz".to_string()]);
        assert_eq!(changes.len(), 1);
        assert!(changes[0].is_removal());
        assert!(map.is_empty());
    }

    #[test]
    fn test_feed_keeps_every_batch_for_slow_subscriber() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();

        for i in 0..1000 {
            feed.emit(apply_set(&mut Entries::new(), entries(json!({ "k": i }))));
        }

        let mut received = 0;
        while let Ok(batch) = rx.try_recv() {
            assert_eq!(batch[0].new_value, Some(json!(received)));
            received += 1;
        }
        assert_eq!(received, 1000);
    }

    #[test]
    fn test_feed_prunes_dropped_subscribers() {
        let feed = ChangeFeed::new();
        let kept = feed.subscribe();
        drop(feed.subscribe());

        feed.emit(apply_set(&mut Entries::new(), entries(json!({ "a": 1 }))));
        assert_eq!(feed.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn test_select() {
        let map = entries(json!({ "a": 1, "b": 2 }));
        let picked = select(&map, &["b".to_string(), "c".to_string()]);
        assert_eq!(Value::Object(picked), json!({ "b": 2 }));
    }
}
