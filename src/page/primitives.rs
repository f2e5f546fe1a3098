//! The page's two network primitives.
//!
//! - Callback style: a [`CallHandle`] is configured with
//!   [`CallbackPrimitive::open`], started with [`CallbackPrimitive::send`], and
//!   reports progress through its ready-state handler.
//! - Promise style: [`PromisePrimitive::fetch`] resolves to a
//!   [`FetchResponse`] or fails with a [`NetworkError`].
//!
//! Page code always calls through the page's slots, so a patch installed in
//! a slot sees every call.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::capture::RequestBody;

// ============================================================================
// NetworkError
// ============================================================================

/// A failure of the page's own network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The request could not be completed.
    #[error("Network request failed: {message}")]
    Failed {
        /// Failure reason.
        message: String,
    },

    /// The request was aborted.
    #[error("Request aborted")]
    Aborted,

    /// The call was used in the wrong state or with bad arguments.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was wrong.
        message: String,
    },

    /// The response body was already read.
    #[error("Response body already used")]
    BodyUsed,
}

impl NetworkError {
    /// Creates a failed error.
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates an invalid request error.
    #[inline]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

// ============================================================================
// ReadyState
// ============================================================================

/// Progress of a callback-style call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ReadyState {
    /// Not opened yet.
    #[default]
    Unsent = 0,
    /// Opened, not sent.
    Opened = 1,
    /// Response headers received.
    HeadersReceived = 2,
    /// Response body loading.
    Loading = 3,
    /// Terminal: the exchange finished or failed.
    Done = 4,
}

// ============================================================================
// CallHandle
// ============================================================================

/// Handler invoked on every ready-state change.
pub type ReadyStateHandler = Arc<dyn Fn(&CallHandle) + Send + Sync>;

/// Monitor bookkeeping carried on a call.
#[derive(Default)]
pub(crate) struct CallTags {
    pub(crate) method: Option<String>,
    pub(crate) url: Option<String>,
    pub(crate) opening: bool,
    pub(crate) sending: bool,
    /// Completion observer, runs before the page's own handler.
    pub(crate) observer: Option<ReadyStateHandler>,
}

#[derive(Default)]
struct CallState {
    ready_state: ReadyState,
    status: u16,
    response_text: String,
    request: Option<(String, String)>,
    on_ready_state_change: Option<ReadyStateHandler>,
    tags: CallTags,
}

/// One callback-style call object. Clones share the call.
#[derive(Clone, Default)]
pub struct CallHandle {
    state: Arc<Mutex<CallState>>,
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CallHandle")
            .field("ready_state", &state.ready_state)
            .field("status", &state.status)
            .field("request", &state.request)
            .finish_non_exhaustive()
    }
}

impl CallHandle {
    /// Creates an unsent call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current ready state.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    /// Returns the HTTP status, 0 until known or on failure.
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        self.state.lock().status
    }

    /// Returns the response text received so far.
    #[must_use]
    pub fn response_text(&self) -> String {
        self.state.lock().response_text.clone()
    }

    /// Returns the method and URL the call was opened with.
    #[must_use]
    pub fn request(&self) -> Option<(String, String)> {
        self.state.lock().request.clone()
    }

    /// Sets the page's ready-state handler.
    pub fn set_on_ready_state_change<F>(&self, handler: F)
    where
        F: Fn(&CallHandle) + Send + Sync + 'static,
    {
        self.state.lock().on_ready_state_change = Some(Arc::new(handler));
    }

    /// Removes the page's ready-state handler.
    pub fn clear_on_ready_state_change(&self) {
        self.state.lock().on_ready_state_change = None;
    }

    // ========================================================================
    // Backend Side
    // ========================================================================

    /// Records the opened request and moves to [`ReadyState::Opened`].
    pub fn begin(&self, method: &str, url: &str) {
        {
            let mut state = self.state.lock();
            state.request = Some((method.to_string(), url.to_string()));
            state.status = 0;
            state.response_text.clear();
            state.ready_state = ReadyState::Opened;
        }
        self.fire();
    }

    /// Moves to an intermediate ready state.
    pub fn advance(&self, ready_state: ReadyState) {
        self.state.lock().ready_state = ready_state;
        self.fire();
    }

    /// Finishes the exchange and moves to [`ReadyState::Done`].
    pub fn complete(&self, status: u16, response_text: impl Into<String>) {
        {
            let mut state = self.state.lock();
            state.status = status;
            state.response_text = response_text.into();
            state.ready_state = ReadyState::Done;
        }
        self.fire();
    }

    /// Runs the monitor observer, then the page's handler, with no lock held.
    fn fire(&self) {
        let (observer, handler) = {
            let state = self.state.lock();
            (
                state.tags.observer.clone(),
                state.on_ready_state_change.clone(),
            )
        };
        if let Some(observer) = observer {
            observer(self);
        }
        if let Some(handler) = handler {
            handler(self);
        }
    }

    // ========================================================================
    // Monitor Side
    // ========================================================================

    pub(crate) fn tags<R>(&self, f: impl FnOnce(&mut CallTags) -> R) -> R {
        f(&mut self.state.lock().tags)
    }
}

// ============================================================================
// CallbackPrimitive
// ============================================================================

/// The callback-style network primitive.
pub trait CallbackPrimitive: Send + Sync {
    /// Configures the call.
    ///
    /// # Errors
    ///
    /// [`NetworkError::InvalidRequest`] for arguments the primitive rejects.
    fn open(&self, call: &CallHandle, method: &str, url: &str) -> Result<(), NetworkError>;

    /// Starts the call. Completion is reported through the call's handler.
    ///
    /// # Errors
    ///
    /// [`NetworkError::InvalidRequest`] if the call is not opened.
    fn send(&self, call: &CallHandle, body: Option<RequestBody>) -> Result<(), NetworkError>;
}

// ============================================================================
// Fetch Types
// ============================================================================

/// One-shot marker placed on a request by the interceptor that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardToken(Uuid);

impl GuardToken {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Configuration of a promise-style call.
#[derive(Debug, Clone, Default)]
pub struct FetchInit {
    /// HTTP method; `GET` when absent.
    pub method: Option<String>,
    /// Request body.
    pub body: Option<RequestBody>,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    pub(crate) guard: Option<GuardToken>,
}

/// A promise-style request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Target URL, possibly relative to the page.
    pub url: String,
    /// Call configuration.
    pub init: FetchInit,
}

impl FetchRequest {
    /// Creates a `GET` request.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            init: FetchInit::default(),
        }
    }

    /// Sets the method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.init.method = Some(method.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.init.body = Some(body);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.init.headers.push((name.into(), value.into()));
        self
    }
}

/// A promise-style response.
///
/// The body can be read once; [`try_clone`](Self::try_clone) yields an
/// independent response with its own unread body.
#[derive(Debug)]
pub struct FetchResponse {
    status: u16,
    url: String,
    body: Arc<[u8]>,
    body_used: AtomicBool,
}

impl FetchResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let body: Vec<u8> = body.into();
        Self {
            status,
            url: url.into(),
            body: Arc::from(body),
            body_used: AtomicBool::new(false),
        }
    }

    /// Returns the HTTP status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns `true` for a 2xx status.
    #[inline]
    #[must_use]
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the response URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` once the body was read.
    #[inline]
    #[must_use]
    pub fn body_used(&self) -> bool {
        self.body_used.load(Ordering::Acquire)
    }

    /// Clones the response with an unread body.
    ///
    /// # Errors
    ///
    /// [`NetworkError::BodyUsed`] if this body was already read.
    pub fn try_clone(&self) -> Result<Self, NetworkError> {
        if self.body_used() {
            return Err(NetworkError::BodyUsed);
        }
        Ok(Self {
            status: self.status,
            url: self.url.clone(),
            body: Arc::clone(&self.body),
            body_used: AtomicBool::new(false),
        })
    }

    /// Reads the body as text, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// [`NetworkError::BodyUsed`] if the body was already read.
    pub async fn text(&self) -> Result<String, NetworkError> {
        if self.body_used.swap(true, Ordering::AcqRel) {
            return Err(NetworkError::BodyUsed);
        }
        tokio::task::yield_now().await;
        Ok(String::from_utf8_lossy(&self.body).into_owned())
    }
}

// ============================================================================
// PromisePrimitive
// ============================================================================

/// The promise-style network primitive.
#[async_trait]
pub trait PromisePrimitive: Send + Sync {
    /// Performs the request.
    ///
    /// # Errors
    ///
    /// Whatever the network reports; a patched primitive passes it through.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, NetworkError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_handler_sees_each_transition() {
        let call = CallHandle::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        call.set_on_ready_state_change(move |c| seen_clone.lock().push(c.ready_state()));

        call.begin("GET", "/a");
        call.advance(ReadyState::HeadersReceived);
        call.complete(200, "ok");

        assert_eq!(
            *seen.lock(),
            [ReadyState::Opened, ReadyState::HeadersReceived, ReadyState::Done]
        );
        assert_eq!(call.response_text(), "ok");
        assert_eq!(call.request(), Some(("GET".to_string(), "/a".to_string())));
    }

    #[test]
    fn test_observer_runs_before_handler() {
        let call = CallHandle::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let page = Arc::clone(&order);
        call.set_on_ready_state_change(move |_| page.lock().push("page"));
        let monitor = Arc::clone(&order);
        call.tags(|t| {
            t.observer = Some(Arc::new(move |_: &CallHandle| monitor.lock().push("monitor")));
        });

        call.complete(200, "");
        assert_eq!(*order.lock(), ["monitor", "page"]);
    }

    #[test]
    fn test_handler_may_reenter_call() {
        let call = CallHandle::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        call.set_on_ready_state_change(move |c| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            let _ = c.status();
            let _ = c.response_text();
        });
        call.complete(204, "");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_response_body_reads_once() {
        let response = FetchResponse::new(200, "/a", "hello");
        let clone = response.try_clone().expect("clone");

        assert_eq!(response.text().await.expect("text"), "hello");
        assert!(matches!(response.text().await, Err(NetworkError::BodyUsed)));
        assert!(matches!(response.try_clone(), Err(NetworkError::BodyUsed)));

        assert_eq!(clone.text().await.expect("clone text"), "hello");
    }

    #[test]
    fn test_request_builder() {
        let request = FetchRequest::new("/items")
            .method("post")
            .body(RequestBody::text("a=1"))
            .header("x-trace", "1");
        assert_eq!(request.init.method.as_deref(), Some("post"));
        assert!(request.init.guard.is_none());
        assert_eq!(request.init.headers.len(), 1);
    }
}
