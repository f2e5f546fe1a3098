//! Monitor entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Monitor`] | Coordinator owning the store owner and the host registry |
//! | [`MonitorBuilder`] | Fluent configuration builder |
//! | [`MonitorOptions`] | Capacities, viewer page and storage backend |
//! | [`TabSession`] | One tab with its page and relay |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for monitor configuration.
pub mod builder;

/// Core monitor implementation.
pub mod core;

/// Monitor options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::MonitorBuilder;
pub use core::{Monitor, TabSession};
pub use options::{MonitorOptions, StorageBackend};
