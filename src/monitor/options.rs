//! Monitor configuration.
//!
//! # Example
//!
//! ```
//! use xhr_monitor::MonitorOptions;
//!
//! let options = MonitorOptions::new()
//!     .with_viewer_page("inspect.html")
//!     .with_file_storage("/tmp/xhr-monitor.json");
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::path::PathBuf;

use crate::observer::DEFAULT_VIEWER_PAGE;

// ============================================================================
// StorageBackend
// ============================================================================

/// Where the durable namespace lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// In memory, lost when the monitor stops.
    #[default]
    Memory,
    /// One JSON file.
    File(PathBuf),
}

// ============================================================================
// MonitorOptions
// ============================================================================

/// Monitor configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Page the viewer opens at.
    pub viewer_page: Cow<'static, str>,

    /// Storage backend.
    pub storage: StorageBackend,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl MonitorOptions {
    /// Creates options with in-memory storage and the default viewer page.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            viewer_page: Cow::Borrowed(DEFAULT_VIEWER_PAGE),
            storage: StorageBackend::Memory,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl MonitorOptions {
    /// Sets the viewer page.
    #[inline]
    #[must_use]
    pub fn with_viewer_page(mut self, page: impl Into<Cow<'static, str>>) -> Self {
        self.viewer_page = page.into();
        self
    }

    /// Keeps the namespace in the JSON file at `path`.
    #[inline]
    #[must_use]
    pub fn with_file_storage(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage = StorageBackend::File(path.into());
        self
    }

    /// Keeps the namespace in memory.
    #[inline]
    #[must_use]
    pub fn with_memory_storage(mut self) -> Self {
        self.storage = StorageBackend::Memory;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl MonitorOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.viewer_page.trim().is_empty() {
            return Err("Viewer page must not be empty".to_string());
        }
        if let StorageBackend::File(path) = &self.storage
            && path.as_os_str().is_empty()
        {
            return Err("Storage file path must not be empty".to_string());
        }
        Ok(())
    }

    /// Returns `true` if storage outlives the monitor.
    #[inline]
    #[must_use]
    pub const fn is_durable(&self) -> bool {
        matches!(self.storage, StorageBackend::File(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_default() {
        let options = MonitorOptions::new();
        assert_eq!(options.viewer_page, "viewer.html");
        assert_eq!(options.storage, StorageBackend::Memory);
        assert!(!options.is_durable());
        assert_eq!(options, MonitorOptions::default());
    }

    #[test]
    fn test_builder_chain() {
        let options = MonitorOptions::new()
            .with_viewer_page(String::from("inspect.html"))
            .with_file_storage("/tmp/monitor.json");

        assert_eq!(options.viewer_page, "inspect.html");
        assert!(options.is_durable());
        assert!(!options.with_memory_storage().is_durable());
    }

    #[test]
    fn test_validate_blank_viewer_page() {
        let options = MonitorOptions::new().with_viewer_page("  ");
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_empty_file_path() {
        let options = MonitorOptions::new().with_file_storage("");
        assert!(options.validate().is_err());
    }
}
