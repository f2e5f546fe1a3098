//! XHR Monitor - per-tab capture of page network traffic.
//!
//! Records the callback-style and promise-style requests a page makes,
//! keeps an append-only log per tab in durable storage, and fans live
//! updates out to any number of observers.
//!
//! # Architecture
//!
//! Four contexts share no mutable state and exchange owned copies only:
//!
//! - **Interceptor**: patches the page's two network entry points and posts
//!   captures on the page channel while active
//! - **Relay**: one per page; toggles the interceptor and forwards captures
//!   to the store owner in order
//! - **Store Owner**: sole writer of durable state; stamps records, tears
//!   down closed tabs, broadcasts changes
//! - **Observers**: popup and viewer surfaces, via [`Inspector`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use url::Url;
//! use xhr_monitor::{FetchRequest, LoopbackNetwork, Monitor, Result, TabId};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let monitor = Monitor::builder().build().await?;
//!
//!     let url = Url::parse("https://shop.test/").expect("url");
//!     let network = Arc::new(LoopbackNetwork::new(url.clone()));
//!     network.route("GET", "/api/cart", 200, r#"{"items":[]}"#);
//!
//!     let tab_id = TabId::new(7).expect("tab id");
//!     let session = monitor.open_tab(tab_id, "Shop", url, network);
//!     let inspector = monitor.inspector();
//!     inspector.start_listening(tab_id).await?;
//!
//!     session.page().fetch(FetchRequest::new("/api/cart")).await.ok();
//!
//!     let view = inspector.records(Some(tab_id)).await?;
//!     println!("{} captured", view.records.len());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bus`] | Broadcast fan-out to observers |
//! | [`capture`] | Captured data and the body codec |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`host`] | Browser-host tab collaborator |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`monitor`] | [`Monitor`] entry point and configuration |
//! | [`observer`] | [`Inspector`] and viewer helpers |
//! | [`page`] | Page primitives, page channel, interceptor |
//! | [`protocol`] | Runtime messages, relay commands, broadcasts |
//! | [`relay`] | Page-adjacent [`Relay`] |
//! | [`store`] | Storage areas, tab store, store owner |
//! | [`transport`] | Runtime and tab channels |

// ============================================================================
// Modules
// ============================================================================

/// Broadcast fan-out to observers.
pub mod bus;

/// Captured exchanges, records and the body codec.
pub mod capture;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Browser-host tab collaborator.
pub mod host;

/// Type-safe identifiers.
pub mod identifiers;

/// Monitor entry point.
///
/// Use [`Monitor::builder()`] to create a configured monitor.
pub mod monitor;

/// Popup and viewer surfaces.
pub mod observer;

/// The page side: primitives, channel and patch.
pub mod page;

/// Message types crossing context boundaries.
pub mod protocol;

/// The page-adjacent relay.
pub mod relay;

/// Durable per-tab state.
pub mod store;

/// Asynchronous channels between contexts.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Capture types
pub use capture::{
    CaptureRecord, CapturedExchange, Params, RequestBody, ResponseBody, encode_params,
    encode_response,
};

// Error types
pub use error::{Error, Result};

// Host types
pub use host::{HostEvent, HostEventReceiver, HostTabRegistry, HostTabs};

// Identifier types
pub use identifiers::{RecordId, SubscriptionId, TabId};

// Monitor types
pub use monitor::{Monitor, MonitorBuilder, MonitorOptions, StorageBackend, TabSession};

// Observer types
pub use observer::{Inspector, RecordView, ViewerLocation};

// Page types
pub use page::{
    CallHandle, CallbackPrimitive, FetchRequest, FetchResponse, InterceptorPhase, LoopbackNetwork,
    NetworkError, PageContext, PromisePrimitive, ReadyState,
};

// Protocol types
pub use protocol::{Broadcast, Message, Reply, TabStatus};

// Relay types
pub use relay::{Badge, MemoryBadge, NoBadge, Relay};

// Store types
pub use store::{ChangeReceiver, FileStorage, MemoryStorage, StorageArea, StoreOwner, TabStore};
