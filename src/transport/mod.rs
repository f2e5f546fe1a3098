//! Context-to-context transport.
//!
//! Every channel is asynchronous and carries owned values. No context
//! calls into another synchronously.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   RuntimeChannel    ┌──────────────┐
//! │ Relay        │────────────────────►│ Store owner  │
//! │ (per tab)    │◄──── Reply ─────────│              │
//! └──────────────┘                     └──────────────┘
//!        ▲                                    ▲
//!        │ TabRouter                          │ RuntimeChannel
//!        │                                    │
//! ┌──────────────┐                            │
//! │ Observer     │────────────────────────────┘
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Message + sender + reply slot |
//! | `runtime` | Channel to the store owner |
//! | `tabs` | Routes to per-tab relays |

// ============================================================================
// Submodules
// ============================================================================

/// Message envelope.
pub mod envelope;

/// Channel to the store owner.
pub mod runtime;

/// Routes to per-tab relays.
pub mod tabs;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Envelope, Responder};
pub use runtime::{RuntimeChannel, RuntimeInbox};
pub use tabs::{TabInbox, TabRouter};
