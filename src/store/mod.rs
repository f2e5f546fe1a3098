//! Durable per-tab state.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `area` | [`StorageArea`] trait and change feed |
//! | `memory` | In-memory backend |
//! | `file` | Single JSON file backend |
//! | `tab_store` | Per-tab key layout and write serialization |
//! | `owner` | [`StoreOwner`] event loop |

// ============================================================================
// Submodules
// ============================================================================

/// Storage trait and change feed.
pub mod area;

/// Single JSON file backend.
pub mod file;

/// In-memory backend.
pub mod memory;

/// The store owner.
pub mod owner;

/// Per-tab key layout.
pub mod tab_store;

// ============================================================================
// Re-exports
// ============================================================================

pub use area::{ChangeReceiver, Entries, StorageArea, StorageChange};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use owner::StoreOwner;
pub use tab_store::{AUTO_REFRESH_KEY, STATE_KEY_PREFIX, TabStore, log_key, parse_log_key, parse_state_key, state_key};

pub use crate::protocol::TabStatus;
