//! Per-tab capture counter display.

use std::fmt::Debug;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::identifiers::TabId;

/// Shows the relay's capture count next to the tab.
pub trait Badge: Send + Sync + Debug {
    /// Displays `count` for the tab.
    fn set_count(&self, tab_id: TabId, count: usize);
}

/// A badge that shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBadge;

impl Badge for NoBadge {
    fn set_count(&self, _tab_id: TabId, _count: usize) {}
}

/// A badge that remembers the last count per tab.
#[derive(Debug, Default)]
pub struct MemoryBadge {
    counts: RwLock<FxHashMap<TabId, usize>>,
}

impl MemoryBadge {
    /// Creates an empty badge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last count shown for the tab.
    #[must_use]
    pub fn count(&self, tab_id: TabId) -> Option<usize> {
        self.counts.read().get(&tab_id).copied()
    }
}

impl Badge for MemoryBadge {
    fn set_count(&self, tab_id: TabId, count: usize) {
        self.counts.write().insert(tab_id, count);
    }
}
