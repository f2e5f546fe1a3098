//! Context-to-context message types.
//!
//! Every payload crossing a context boundary is one of these owned,
//! serializable values. Nothing holds a reference into another context.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Message` | Relay / Observer → Store owner | Runtime request |
//! | `RelayCommand` | Observer → Relay | Capture control |
//! | `Reply` | Receiver → Sender | `{success, error?, ...}` |
//! | `Broadcast` | Store owner → Observers | State-change notification |
//!
//! The page channel messages live with the page, see
//! [`PageMessage`](crate::page::PageMessage).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `broadcast` | Fan-out notifications |
//! | `message` | Runtime messages and relay commands |
//! | `reply` | Reply envelope and typed payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Fan-out notifications.
pub mod broadcast;

/// Runtime messages and relay commands.
pub mod message;

/// Reply envelope and typed payloads.
pub mod reply;

// ============================================================================
// Re-exports
// ============================================================================

pub use broadcast::Broadcast;
pub use message::{Message, MessageSender, RelayCommand};
pub use reply::{NewCount, Reply, StoredRequests, TabStatus, TabTitle};
