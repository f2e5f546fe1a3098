//! Interceptor phase machine.
//!
//! ```text
//! Uninstalled ──install──► Inactive ◄──stop── Active
//!                             │    ──start──►   │
//!                             └──unload──► Unloading ◄──unload──┘
//! ```
//!
//! `Unloading` is terminal.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use tracing::{debug, trace};
use url::Url;

use crate::capture::CapturedExchange;
use crate::page::channel::{ControlAction, PageChannel, PageMessage};

// ============================================================================
// InterceptorPhase
// ============================================================================

/// Lifecycle phase of a page's interceptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterceptorPhase {
    /// No patch in place.
    #[default]
    Uninstalled,
    /// Patched, not capturing.
    Inactive,
    /// Patched and capturing.
    Active,
    /// The page is going away; nothing is captured any more.
    Unloading,
}

impl InterceptorPhase {
    /// Phase after installing the patch.
    #[must_use]
    pub fn installed(self) -> Self {
        match self {
            Self::Uninstalled => Self::Inactive,
            other => other,
        }
    }

    /// Phase after a control action. Ignored unless installed and not unloading.
    #[must_use]
    pub fn on_control(self, action: ControlAction) -> Self {
        match (self, action) {
            (Self::Inactive | Self::Active, ControlAction::Start) => Self::Active,
            (Self::Inactive | Self::Active, ControlAction::Stop) => Self::Inactive,
            (other, _) => other,
        }
    }

    /// Phase after the page-teardown signal.
    #[inline]
    #[must_use]
    pub fn unloaded(self) -> Self {
        Self::Unloading
    }

    /// Returns `true` if calls are captured.
    #[inline]
    #[must_use]
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

// ============================================================================
// InterceptorCore
// ============================================================================

/// State shared by the patched primitives and the control task.
#[derive(Debug)]
pub(crate) struct InterceptorCore {
    phase: Mutex<InterceptorPhase>,
    channel: PageChannel,
    origin: Option<Url>,
}

impl InterceptorCore {
    pub(crate) fn new(channel: PageChannel, origin: Option<Url>) -> Self {
        Self {
            phase: Mutex::new(InterceptorPhase::Uninstalled),
            channel,
            origin,
        }
    }

    pub(crate) fn phase(&self) -> InterceptorPhase {
        *self.phase.lock()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.phase().is_active()
    }

    pub(crate) fn is_unloading(&self) -> bool {
        self.phase() == InterceptorPhase::Unloading
    }

    /// Page origin used to resolve relative request URLs.
    pub(crate) fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    pub(crate) fn mark_installed(&self) {
        let mut phase = self.phase.lock();
        *phase = phase.installed();
    }

    pub(crate) fn apply(&self, action: ControlAction) {
        let mut phase = self.phase.lock();
        let current = *phase;
        let next = current.on_control(action);
        if next != current {
            debug!(from = ?current, to = ?next, "Interceptor phase changed");
        }
        *phase = next;
    }

    pub(crate) fn begin_unload(&self) {
        let mut phase = self.phase.lock();
        let current = *phase;
        if current != InterceptorPhase::Unloading {
            debug!(from = ?current, "Interceptor unloading");
        }
        *phase = current.unloaded();
    }

    /// Posts a capture unless the page is unloading.
    pub(crate) fn emit(&self, exchange: CapturedExchange) {
        if self.is_unloading() {
            trace!(url = %exchange.url, "Dropping capture, page unloading");
            return;
        }
        trace!(method = %exchange.method, url = %exchange.url, "Capture emitted");
        self.channel.post(PageMessage::Captured { payload: exchange });
    }

    pub(crate) fn post_ready(&self) {
        self.channel.post(PageMessage::Ready);
    }
}

// ============================================================================
// Tests
// ============================================================================
