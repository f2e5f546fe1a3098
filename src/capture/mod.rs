//! Captured data and the body codec.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Request params and response body decoding |
//! | `record` | [`CapturedExchange`], [`CaptureRecord`], [`ResponseBody`] |

// ============================================================================
// Submodules
// ============================================================================

/// Request params and response body decoding.
pub mod codec;

/// Captured exchange and record types.
pub mod record;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{RequestBody, encode_params, encode_params_at, encode_response, normalize_method};
pub use record::{CaptureRecord, CapturedExchange, Params, ResponseBody, epoch_millis};
