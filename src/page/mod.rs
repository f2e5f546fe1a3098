//! The page side: network primitives, the page channel, and the patch.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | [`PageChannel`] and [`PageMessage`] |
//! | `context` | [`PageContext`], the page's entry-point slots |
//! | `interceptor` | [`Interceptor`] and [`InterceptorPhase`] |
//! | `loopback` | [`LoopbackNetwork`] backend |
//! | `primitives` | Callback and promise primitive traits |

// ============================================================================
// Submodules
// ============================================================================

/// Page channel messages.
pub mod channel;

/// Page entry points.
pub mod context;

/// The page patch.
pub mod interceptor;

/// In-process network backend.
pub mod loopback;

/// Network primitive traits and call types.
pub mod primitives;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ControlAction, PageChannel, PageListener, PageMessage};
pub use context::PageContext;
pub use interceptor::{Interceptor, InterceptorPhase};
pub use loopback::LoopbackNetwork;
pub use primitives::{
    CallHandle, CallbackPrimitive, FetchInit, FetchRequest, FetchResponse, GuardToken,
    NetworkError, PromisePrimitive, ReadyState, ReadyStateHandler,
};
