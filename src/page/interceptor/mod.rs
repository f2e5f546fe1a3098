//! The page patch.
//!
//! Installing the interceptor wraps both of the page's network entry points
//! and starts a task that follows control messages on the page channel.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `state` | [`InterceptorPhase`] and the shared core |
//! | `callback` | Callback-style wrapper |
//! | `promise` | Promise-style wrapper |

// ============================================================================
// Submodules
// ============================================================================

mod callback;
mod promise;
mod state;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, trace};
use url::Url;

use self::callback::CallbackInterceptor;
use self::promise::PromiseInterceptor;
use self::state::InterceptorCore;
use super::channel::{PageChannel, PageListener, PageMessage};
use super::context::{CallbackSlot, PromiseSlot};

// ============================================================================
// Re-exports
// ============================================================================

pub use state::InterceptorPhase;

// ============================================================================
// Interceptor
// ============================================================================

/// The installed patch of one page.
///
/// Dropping it stops the control task; the wrapped entry points stay in
/// place for as long as the page lives.
#[derive(Debug)]
pub struct Interceptor {
    core: Arc<InterceptorCore>,
    control_task: JoinHandle<()>,
}

impl Interceptor {
    /// Wraps both slots, starts listening for control, then announces readiness.
    pub(crate) fn install(
        channel: &PageChannel,
        origin: Option<Url>,
        callback: &Arc<CallbackSlot>,
        promise: &Arc<PromiseSlot>,
    ) -> Self {
        let core = Arc::new(InterceptorCore::new(channel.clone(), origin));

        {
            let mut slot = callback.write();
            let original = Arc::clone(&*slot);
            *slot = Arc::new(CallbackInterceptor::new(original, Arc::clone(&core)));
        }
        {
            let mut slot = promise.write();
            let original = Arc::clone(&*slot);
            *slot = Arc::new(PromiseInterceptor::new(
                original,
                Arc::clone(&core),
                Arc::downgrade(promise),
            ));
        }

        let control = channel.subscribe();
        let control_task = tokio::spawn(follow_control(Arc::clone(&core), control));

        core.mark_installed();
        debug!("Interceptor installed");
        core.post_ready();

        Self { core, control_task }
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> InterceptorPhase {
        self.core.phase()
    }

    pub(crate) fn begin_unload(&self) {
        self.core.begin_unload();
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        self.control_task.abort();
    }
}

/// Applies control messages until the page unloads.
async fn follow_control(core: Arc<InterceptorCore>, mut control: PageListener) {
    while let Some(message) = control.recv().await {
        if let PageMessage::Control { action } = message {
            trace!(?action, "Control message received");
            core.apply(action);
        }
        if core.is_unloading() {
            break;
        }
    }
    trace!("Interceptor control task stopped");
}
