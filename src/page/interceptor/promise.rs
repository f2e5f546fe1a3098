//! Patched promise-style primitive.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::capture::{
    CapturedExchange, RequestBody, encode_params_at, encode_response, normalize_method,
};
use crate::page::context::PromiseSlot;
use crate::page::primitives::{
    FetchRequest, FetchResponse, GuardToken, NetworkError, PromisePrimitive,
};

use super::state::InterceptorCore;

// ============================================================================
// PromiseInterceptor
// ============================================================================

/// Wraps the page's promise-style primitive.
///
/// A captured call is tagged with this interceptor's [`GuardToken`] and
/// re-issued through the page's slot, so wrappers layered on top still see
/// it. When the tagged call comes back here the token is removed and the
/// call goes to the wrapped primitive.
pub(crate) struct PromiseInterceptor {
    original: Arc<dyn PromisePrimitive>,
    core: Arc<InterceptorCore>,
    slot: Weak<PromiseSlot>,
    token: GuardToken,
}

impl PromiseInterceptor {
    pub(crate) fn new(
        original: Arc<dyn PromisePrimitive>,
        core: Arc<InterceptorCore>,
        slot: Weak<PromiseSlot>,
    ) -> Self {
        Self {
            original,
            core,
            slot,
            token: GuardToken::new(),
        }
    }

    /// Reads the cloned body in the background and emits the capture.
    fn observe(
        &self,
        clone: FetchResponse,
        method: String,
        url: String,
        body: Option<RequestBody>,
    ) {
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            let text = match clone.text().await {
                Ok(text) => text,
                Err(e) => {
                    if !core.is_unloading() {
                        warn!(url = %url, error = %e, "Failed to read cloned response");
                    }
                    return;
                }
            };
            if core.is_unloading() {
                trace!(url = %url, "Page unloaded before response was read");
                return;
            }
            let params = encode_params_at(core.origin(), &method, &url, body.as_ref());
            core.emit(CapturedExchange {
                url,
                method,
                params,
                response: encode_response(&text),
            });
        });
    }
}

#[async_trait]
impl PromisePrimitive for PromiseInterceptor {
    async fn fetch(&self, mut request: FetchRequest) -> Result<FetchResponse, NetworkError> {
        if request.init.guard == Some(self.token) {
            request.init.guard = None;
            return self.original.fetch(request).await;
        }

        if !self.core.is_active() {
            return self.original.fetch(request).await;
        }

        let method = normalize_method(request.init.method.as_deref());
        let url = request.url.clone();
        let body = request.init.body.clone();

        let entry = self.slot.upgrade().map(|slot| Arc::clone(&*slot.read()));
        let response = match entry {
            Some(entry) => {
                request.init.guard = Some(self.token);
                entry.fetch(request).await
            }
            None => self.original.fetch(request).await,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                if !self.core.is_unloading() {
                    debug!(url = %url, error = %e, "Observed request failed");
                }
                return Err(e);
            }
        };

        if self.core.is_unloading() {
            return Ok(response);
        }

        match response.try_clone() {
            Ok(clone) => self.observe(clone, method, url, body),
            Err(e) => warn!(url = %url, error = %e, "Failed to clone response"),
        }
        Ok(response)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::RwLock;

    use crate::page::channel::{ControlAction, PageChannel, PageMessage};

    /// Answers every request with the request URL as body.
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PromisePrimitive for Echo {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.init.guard.is_none(), "token leaked to the network");
            if request.url.contains("down") {
                return Err(NetworkError::failed("connection refused"));
            }
            let body = format!(r#"{{"url":"{}"}}"#, request.url);
            Ok(FetchResponse::new(200, request.url, body))
        }
    }

    struct Setup {
        slot: Arc<PromiseSlot>,
        echo: Arc<Echo>,
        core: Arc<InterceptorCore>,
        rx: Listener,
    }

    type Listener = crate::page::channel::PageListener;

    fn setup(active: bool) -> Setup {
        let channel = PageChannel::new();
        let rx = channel.subscribe();
        let core = Arc::new(InterceptorCore::new(channel, None));
        core.mark_installed();
        if active {
            core.apply(ControlAction::Start);
        }

        let echo = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let original: Arc<dyn PromisePrimitive> = echo.clone();
        let slot: Arc<PromiseSlot> = Arc::new(RwLock::new(Arc::clone(&original)));
        let patched = PromiseInterceptor::new(original, Arc::clone(&core), Arc::downgrade(&slot));
        *slot.write() = Arc::new(patched);

        Setup { slot, echo, core, rx }
    }

    async fn fetch(slot: &PromiseSlot, request: FetchRequest) -> Result<FetchResponse, NetworkError> {
        let entry = Arc::clone(&*slot.read());
        entry.fetch(request).await
    }

    async fn next_capture(rx: &mut Listener) -> CapturedExchange {
        loop {
            if let PageMessage::Captured { payload } = rx.recv().await.expect("message") {
                return payload;
            }
        }
    }

    #[tokio::test]
    async fn test_active_fetch_captured_and_response_untouched() {
        let mut s = setup(true);
        let response = fetch(&s.slot, FetchRequest::new("/items?x=1")).await.expect("fetch");

        assert!(!response.body_used());
        assert_eq!(response.text().await.expect("page reads body"), r#"{"url":"/items?x=1"}"#);

        let captured = next_capture(&mut s.rx).await;
        assert_eq!(captured.method, "GET");
        assert_eq!(captured.params.get("x"), Some(&serde_json::json!("1")));
        assert_eq!(s.echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inactive_fetch_delegates() {
        let mut s = setup(false);
        fetch(&s.slot, FetchRequest::new("/a")).await.expect("fetch");
        tokio::task::yield_now().await;
        assert!(s.rx.try_recv().is_err());
        assert_eq!(s.echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_passes_through() {
        let mut s = setup(true);
        let err = fetch(&s.slot, FetchRequest::new("/down")).await.unwrap_err();
        assert_eq!(err, NetworkError::failed("connection refused"));
        tokio::task::yield_now().await;
        assert!(s.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unload_between_response_and_read() {
        let mut s = setup(true);
        let response = fetch(&s.slot, FetchRequest::new("/slow")).await.expect("fetch");
        s.core.begin_unload();

        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(s.rx.try_recv().is_err());
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_falls_back_when_slot_gone() {
        let s = setup(true);
        let patched = Arc::clone(&*s.slot.read());
        drop(s.slot);
        assert!(patched.fetch(FetchRequest::new("/a")).await.is_ok());
        assert_eq!(s.echo.calls.load(Ordering::SeqCst), 1);
    }
}
