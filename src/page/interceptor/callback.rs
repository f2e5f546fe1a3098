//! Patched callback-style primitive.

// ============================================================================
// Imports
// ============================================================================

use std::mem;
use std::sync::Arc;

use tracing::trace;

use crate::capture::{
    CapturedExchange, RequestBody, encode_params_at, encode_response, normalize_method,
};
use crate::page::primitives::{CallHandle, CallbackPrimitive, NetworkError, ReadyState};

use super::state::InterceptorCore;

// ============================================================================
// CallbackInterceptor
// ============================================================================

/// Wraps the page's callback-style primitive.
///
/// Each entry point is guarded by a per-call flag: a nested invocation for
/// the same call (a shim that calls back into the page's slot) goes straight
/// to the wrapped primitive and is not observed twice.
pub(crate) struct CallbackInterceptor {
    original: Arc<dyn CallbackPrimitive>,
    core: Arc<InterceptorCore>,
}

impl CallbackInterceptor {
    pub(crate) fn new(original: Arc<dyn CallbackPrimitive>, core: Arc<InterceptorCore>) -> Self {
        Self { original, core }
    }

    /// Builds the completion observer for one exchange.
    fn observer(
        &self,
        method: String,
        url: String,
        body: Option<RequestBody>,
    ) -> impl Fn(&CallHandle) + Send + Sync + 'static {
        let core = Arc::clone(&self.core);
        move |call: &CallHandle| {
            if call.ready_state() != ReadyState::Done || core.is_unloading() {
                return;
            }
            let params = encode_params_at(core.origin(), &method, &url, body.as_ref());
            let response = encode_response(&call.response_text());
            core.emit(CapturedExchange {
                url: url.clone(),
                method: method.clone(),
                params,
                response,
            });
        }
    }
}

impl CallbackPrimitive for CallbackInterceptor {
    fn open(&self, call: &CallHandle, method: &str, url: &str) -> Result<(), NetworkError> {
        if call.tags(|t| mem::replace(&mut t.opening, true)) {
            trace!(url, "Nested open, passing through");
            return self.original.open(call, method, url);
        }

        call.tags(|t| {
            t.method = Some(method.to_string());
            t.url = Some(url.to_string());
        });

        let result = self.original.open(call, method, url);
        call.tags(|t| t.opening = false);
        result
    }

    fn send(&self, call: &CallHandle, body: Option<RequestBody>) -> Result<(), NetworkError> {
        if call.tags(|t| mem::replace(&mut t.sending, true)) {
            trace!("Nested send, passing through");
            return self.original.send(call, body);
        }

        let target = call.tags(|t| {
            t.observer = None;
            t.url.clone().map(|url| (normalize_method(t.method.as_deref()), url))
        });

        if self.core.is_active()
            && let Some((method, url)) = target
        {
            let observer = self.observer(method, url, body.clone());
            call.tags(|t| t.observer = Some(Arc::new(observer)));
        }

        let result = self.original.send(call, body);
        call.tags(|t| t.sending = false);
        result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::page::channel::{ControlAction, PageChannel, PageMessage};

    /// Completes every call synchronously with a fixed body.
    struct Immediate {
        opens: AtomicUsize,
        sends: AtomicUsize,
    }

    impl Immediate {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                opens: AtomicUsize::new(0),
                sends: AtomicUsize::new(0),
            })
        }
    }

    impl CallbackPrimitive for Immediate {
        fn open(&self, call: &CallHandle, method: &str, url: &str) -> Result<(), NetworkError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            call.begin(method, url);
            Ok(())
        }

        fn send(&self, call: &CallHandle, _body: Option<RequestBody>) -> Result<(), NetworkError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            call.complete(200, r#"{"ok":true}"#);
            Ok(())
        }
    }

    type Listener = crate::page::channel::PageListener;

    fn setup(active: bool) -> (CallbackInterceptor, Arc<Immediate>, Listener) {
        let channel = PageChannel::new();
        let rx = channel.subscribe();
        let core = Arc::new(InterceptorCore::new(channel, None));
        core.mark_installed();
        if active {
            core.apply(ControlAction::Start);
        }
        let backend = Immediate::new();
        let original: Arc<dyn CallbackPrimitive> = backend.clone();
        (CallbackInterceptor::new(original, core), backend, rx)
    }

    fn captures(rx: &mut Listener) -> Vec<CapturedExchange> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let PageMessage::Captured { payload } = message {
                out.push(payload);
            }
        }
        out
    }

    #[test]
    fn test_active_call_captured_once() {
        let (patched, _, mut rx) = setup(true);
        let call = CallHandle::new();
        patched.open(&call, "post", "/login?next=home").expect("open");
        patched
            .send(&call, Some(RequestBody::text("user=ann")))
            .expect("send");

        let captured = captures(&mut rx);
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].method, "POST");
        assert_eq!(captured[0].params.get("user"), Some(&serde_json::json!("ann")));
        assert_eq!(captured[0].params.get("next"), Some(&serde_json::json!("home")));
    }

    #[test]
    fn test_inactive_call_not_captured() {
        let (patched, backend, mut rx) = setup(false);
        let call = CallHandle::new();
        patched.open(&call, "GET", "/a").expect("open");
        patched.send(&call, None).expect("send");

        assert!(captures(&mut rx).is_empty());
        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
        assert_eq!(backend.sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_page_handler_still_runs() {
        let (patched, _, _rx) = setup(true);
        let call = CallHandle::new();
        let done = Arc::new(AtomicUsize::new(0));
        let done_clone = Arc::clone(&done);
        call.set_on_ready_state_change(move |c| {
            if c.ready_state() == ReadyState::Done {
                done_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        patched.open(&call, "GET", "/a").expect("open");
        patched.send(&call, None).expect("send");
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(call.status(), 200);
    }

    #[test]
    fn test_send_without_open_not_captured() {
        let (patched, _, mut rx) = setup(true);
        let call = CallHandle::new();
        patched.send(&call, None).expect("send");
        assert!(captures(&mut rx).is_empty());
    }

    #[test]
    fn test_unloading_suppresses_completion() {
        let (patched, _, mut rx) = setup(true);
        let call = CallHandle::new();
        patched.open(&call, "GET", "/a").expect("open");
        patched.core.begin_unload();
        patched.send(&call, None).expect("send");
        assert!(captures(&mut rx).is_empty());
    }
}
