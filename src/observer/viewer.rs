//! Viewer location and display ordering.
//!
//! The viewer is addressed as `viewer.html?tabId=7&tabTitle=Shop&index=1`.
//! Without `tabId` it shows every stored log.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use url::form_urlencoded;

use crate::capture::CaptureRecord;
use crate::error::{Error, Result};
use crate::identifiers::TabId;

// ============================================================================
// Constants
// ============================================================================

/// Default viewer page.
pub const DEFAULT_VIEWER_PAGE: &str = "viewer.html";

/// Title shown when the location names none.
pub const UNKNOWN_TITLE: &str = "Unknown title";

// ============================================================================
// ViewerLocation
// ============================================================================

/// Where the inspector view opens and which tab it shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerLocation {
    /// Viewer page, without query.
    pub page: String,
    /// Tab to show; `None` shows every tab.
    pub tab_id: Option<TabId>,
    /// Title of the shown tab.
    pub tab_title: String,
    /// Position of the shown tab in its window.
    pub index: Option<u32>,
}

impl ViewerLocation {
    /// Creates a location showing one tab.
    #[must_use]
    pub fn for_tab(page: impl Into<String>, tab_id: TabId, tab_title: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            tab_id: Some(tab_id),
            tab_title: tab_title.into(),
            index: None,
        }
    }

    /// Sets the tab index.
    #[must_use]
    pub fn with_index(mut self, index: Option<u32>) -> Self {
        self.index = index;
        self
    }

    /// Returns the query string, without the leading `?`.
    #[must_use]
    pub fn to_query(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(tab_id) = self.tab_id {
            parts.push(format!("tabId={tab_id}"));
        }
        parts.push(format!("tabTitle={}", urlencoding::encode(&self.tab_title)));
        if let Some(index) = self.index {
            parts.push(format!("index={index}"));
        }
        parts.join("&")
    }

    /// Returns the full location `page?query`.
    #[must_use]
    pub fn to_url(&self) -> String {
        format!("{}?{}", self.page, self.to_query())
    }

    /// Parses a location produced by [`to_url`](Self::to_url).
    ///
    /// A missing `tabId` selects the all-tabs view; a missing title
    /// becomes [`UNKNOWN_TITLE`].
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] if `tabId` or `index` is present but invalid.
    pub fn parse(location: &str) -> Result<Self> {
        let (page, query) = location.split_once('?').unwrap_or((location, ""));

        let mut parsed = Self {
            page: page.to_string(),
            tab_id: None,
            tab_title: UNKNOWN_TITLE.to_string(),
            index: None,
        };

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "tabId" => parsed.tab_id = Some(value.parse()?),
                "tabTitle" if !value.is_empty() => parsed.tab_title = value.into_owned(),
                "index" => {
                    parsed.index = Some(value.parse().map_err(|_| {
                        Error::protocol(format!("invalid viewer index: {value:?}"))
                    })?);
                }
                _ => {}
            }
        }

        Ok(parsed)
    }
}

impl fmt::Display for ViewerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// Sorts records newest first. Records with equal timestamps keep their
/// append order.
pub fn sort_newest_first(records: &mut [CaptureRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

// ============================================================================
// Tests
// ============================================================================
