//! In-process network backend.
//!
//! Answers both primitives from registered routes. Routes match on the
//! upper-cased method and the resolved path; the query string is ignored.
//! Anything unrouted gets a `404`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::trace;
use url::Url;

use crate::capture::{RequestBody, normalize_method};

use super::primitives::{
    CallHandle, CallbackPrimitive, FetchRequest, FetchResponse, NetworkError, PromisePrimitive,
    ReadyState,
};

// ============================================================================
// Route
// ============================================================================

#[derive(Debug, Clone)]
enum Route {
    Respond { status: u16, body: String },
    Fail { message: String },
}

const NOT_FOUND: Route = Route::Respond {
    status: 404,
    body: String::new(),
};

// ============================================================================
// LoopbackNetwork
// ============================================================================

/// A scripted network shared by both page primitives.
#[derive(Debug)]
pub struct LoopbackNetwork {
    origin: Url,
    routes: RwLock<FxHashMap<(String, String), Route>>,
    calls: AtomicUsize,
}

impl LoopbackNetwork {
    /// Creates a backend resolving relative URLs against `origin`.
    #[must_use]
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            routes: RwLock::new(FxHashMap::default()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers `method path` with `status` and `body`.
    pub fn route(&self, method: &str, path: &str, status: u16, body: impl Into<String>) -> &Self {
        self.insert(
            method,
            path,
            Route::Respond {
                status,
                body: body.into(),
            },
        )
    }

    /// Answers `method path` with `200` and a JSON body.
    pub fn route_json(&self, method: &str, path: &str, body: &Value) -> &Self {
        self.route(method, path, 200, body.to_string())
    }

    /// Makes `method path` fail at the network level.
    pub fn fail(&self, method: &str, path: &str, message: impl Into<String>) -> &Self {
        self.insert(
            method,
            path,
            Route::Fail {
                message: message.into(),
            },
        )
    }

    /// Returns how many requests reached the backend.
    #[inline]
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn insert(&self, method: &str, path: &str, route: Route) -> &Self {
        let key = (normalize_method(Some(method)), path.to_string());
        self.routes.write().insert(key, route);
        self
    }

    fn resolve(&self, url: &str) -> Result<Url, NetworkError> {
        self.origin
            .join(url)
            .map_err(|e| NetworkError::invalid(format!("bad URL {url}: {e}")))
    }

    fn lookup(&self, method: &str, url: &Url) -> Route {
        let key = (normalize_method(Some(method)), url.path().to_string());
        self.routes.read().get(&key).cloned().unwrap_or(NOT_FOUND)
    }
}

// ============================================================================
// Callback Style
// ============================================================================

impl CallbackPrimitive for LoopbackNetwork {
    fn open(&self, call: &CallHandle, method: &str, url: &str) -> Result<(), NetworkError> {
        self.resolve(url)?;
        call.begin(method, url);
        Ok(())
    }

    /// Completes the call on a spawned task, so a runtime must be current.
    fn send(&self, call: &CallHandle, _body: Option<RequestBody>) -> Result<(), NetworkError> {
        if call.ready_state() != ReadyState::Opened {
            return Err(NetworkError::invalid("call is not opened"));
        }
        let (method, url) = call
            .request()
            .ok_or_else(|| NetworkError::invalid("call has no request"))?;
        let route = self.lookup(&method, &self.resolve(&url)?);
        let runtime =
            Handle::try_current().map_err(|_| NetworkError::failed("no async runtime"))?;

        self.calls.fetch_add(1, Ordering::SeqCst);
        trace!(method = %method, url = %url, "Loopback call");

        let call = call.clone();
        runtime.spawn(async move {
            tokio::task::yield_now().await;
            match route {
                Route::Respond { status, body } => {
                    call.advance(ReadyState::HeadersReceived);
                    call.advance(ReadyState::Loading);
                    call.complete(status, body);
                }
                Route::Fail { .. } => call.complete(0, ""),
            }
        });
        Ok(())
    }
}

// ============================================================================
// Promise Style
// ============================================================================

#[async_trait]
impl PromisePrimitive for LoopbackNetwork {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, NetworkError> {
        let url = self.resolve(&request.url)?;
        let method = normalize_method(request.init.method.as_deref());
        let route = self.lookup(&method, &url);

        self.calls.fetch_add(1, Ordering::SeqCst);
        trace!(method = %method, url = %url, "Loopback fetch");
        tokio::task::yield_now().await;

        match route {
            Route::Respond { status, body } => Ok(FetchResponse::new(status, url.as_str(), body)),
            Route::Fail { message } => Err(NetworkError::failed(message)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::Notify;

    fn network() -> LoopbackNetwork {
        let network = LoopbackNetwork::new(Url::parse("http://shop.test/").expect("url"));
        network
            .route_json("GET", "/api/items", &json!({ "items": [] }))
            .fail("POST", "/api/down", "connection reset");
        network
    }

    #[tokio::test]
    async fn test_fetch_routes_by_method_and_path() {
        let network = network();
        let response = network
            .fetch(FetchRequest::new("/api/items?page=2"))
            .await
            .expect("fetch");
        assert_eq!(response.status(), 200);
        assert_eq!(response.url(), "http://shop.test/api/items?page=2");
        assert_eq!(response.text().await.expect("text"), r#"{"items":[]}"#);

        let missing = network
            .fetch(FetchRequest::new("/api/items").method("DELETE"))
            .await
            .expect("fetch");
        assert_eq!(missing.status(), 404);
        assert_eq!(network.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_route() {
        let network = network();
        let err = network
            .fetch(FetchRequest::new("/api/down").method("post"))
            .await
            .unwrap_err();
        assert_eq!(err, NetworkError::failed("connection reset"));
    }

    #[tokio::test]
    async fn test_callback_completes_asynchronously() {
        let network = network();
        let call = CallHandle::new();
        let done = Arc::new(Notify::new());
        let notify = Arc::clone(&done);
        call.set_on_ready_state_change(move |c| {
            if c.ready_state() == ReadyState::Done {
                notify.notify_one();
            }
        });

        network.open(&call, "GET", "/api/items").expect("open");
        network.send(&call, None).expect("send");
        assert_ne!(call.ready_state(), ReadyState::Done);

        done.notified().await;
        assert_eq!(call.status(), 200);
        assert_eq!(call.response_text(), r#"{"items":[]}"#);
    }

    #[tokio::test]
    async fn test_callback_failure_completes_with_status_zero() {
        let network = network();
        let call = CallHandle::new();
        let done = Arc::new(Notify::new());
        let notify = Arc::clone(&done);
        call.set_on_ready_state_change(move |c| {
            if c.ready_state() == ReadyState::Done {
                notify.notify_one();
            }
        });

        network.open(&call, "POST", "/api/down").expect("open");
        network.send(&call, None).expect("send");
        done.notified().await;
        assert_eq!(call.status(), 0);
        assert!(call.response_text().is_empty());
    }

    #[tokio::test]
    async fn test_send_requires_open() {
        let network = network();
        let call = CallHandle::new();
        assert!(matches!(
            network.send(&call, None),
            Err(NetworkError::InvalidRequest { .. })
        ));
        assert_eq!(network.call_count(), 0);
    }
}
