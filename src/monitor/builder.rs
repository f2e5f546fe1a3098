//! Builder pattern for monitor configuration.
//!
//! # Example
//!
//! ```no_run
//! use xhr_monitor::Monitor;
//!
//! # async fn example() -> xhr_monitor::Result<()> {
//! let monitor = Monitor::builder()
//!     .file_storage("./captures.json")
//!     .viewer_page("viewer.html")
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::relay::{Badge, NoBadge};
use crate::store::{FileStorage, MemoryStorage, StorageArea};

use super::core::Monitor;
use super::options::{MonitorOptions, StorageBackend};

// ============================================================================
// MonitorBuilder
// ============================================================================

/// Builder for configuring a [`Monitor`].
///
/// Use [`Monitor::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct MonitorBuilder {
    options: MonitorOptions,
    /// Storage area used instead of the configured backend.
    area: Option<Arc<dyn StorageArea>>,
    badge: Option<Arc<dyn Badge>>,
}

impl fmt::Debug for MonitorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorBuilder")
            .field("options", &self.options)
            .field("custom_area", &self.area.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// MonitorBuilder Implementation
// ============================================================================

impl MonitorBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every option at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: MonitorOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the page the viewer opens at.
    #[inline]
    #[must_use]
    pub fn viewer_page(mut self, page: impl Into<Cow<'static, str>>) -> Self {
        self.options.viewer_page = page.into();
        self
    }

    /// Keeps the namespace in the JSON file at `path`.
    #[inline]
    #[must_use]
    pub fn file_storage(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.storage = StorageBackend::File(path.into());
        self
    }

    /// Uses an existing storage area, ignoring the configured backend.
    #[inline]
    #[must_use]
    pub fn storage_area(mut self, area: Arc<dyn StorageArea>) -> Self {
        self.area = Some(area);
        self
    }

    /// Sets the counter display used by every relay.
    #[inline]
    #[must_use]
    pub fn badge(mut self, badge: Arc<dyn Badge>) -> Self {
        self.badge = Some(badge);
        self
    }

    /// Opens storage and starts the store owner.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Storage`] or [`Error::Io`] if the storage file cannot be
    ///   opened or stale tab state cannot be removed
    pub async fn build(self) -> Result<Monitor> {
        self.options.validate().map_err(Error::config)?;

        let area = match self.area {
            Some(area) => area,
            None => open_backend(&self.options.storage).await?,
        };
        let badge = self.badge.unwrap_or_else(|| Arc::new(NoBadge));

        Monitor::start(self.options, area, badge).await
    }
}

async fn open_backend(backend: &StorageBackend) -> Result<Arc<dyn StorageArea>> {
    Ok(match backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::File(path) => Arc::new(FileStorage::open(path.clone()).await?),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_options() {
        let builder = MonitorBuilder::new();
        assert_eq!(builder.options, MonitorOptions::new());
        assert!(builder.area.is_none());
        assert!(builder.badge.is_none());
    }

    #[test]
    fn test_setters() {
        let builder = MonitorBuilder::new()
            .viewer_page("inspect.html")
            .file_storage("/tmp/captures.json");
        assert_eq!(builder.options.viewer_page, "inspect.html");
        assert!(builder.options.is_durable());
    }

    #[tokio::test]
    async fn test_build_fails_with_invalid_options() {
        let err = MonitorBuilder::new()
            .viewer_page(" ")
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("Viewer page"));
    }

    #[tokio::test]
    async fn test_build_with_file_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let monitor = MonitorBuilder::new()
            .file_storage(dir.path().join("captures.json"))
            .build()
            .await
            .expect("build");
        assert!(monitor.options().is_durable());
    }

    #[tokio::test]
    async fn test_build_fails_on_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("captures.json");
        std::fs::write(&path, "[1, 2").expect("write");

        let result = MonitorBuilder::new().file_storage(path).build().await;
        assert!(result.is_err());
    }
}
