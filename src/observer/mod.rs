//! Observers: the popup and viewer surfaces.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `inspector` | [`Inspector`] client handle |
//! | `viewer` | [`ViewerLocation`] and display ordering |

// ============================================================================
// Submodules
// ============================================================================

/// Client handle for popup and viewer.
pub mod inspector;

/// Viewer location and ordering.
pub mod viewer;

// ============================================================================
// Re-exports
// ============================================================================

pub use inspector::{Inspector, RecordView};
pub use viewer::{DEFAULT_VIEWER_PAGE, UNKNOWN_TITLE, ViewerLocation, sort_newest_first};
