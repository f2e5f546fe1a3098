//! One page: its URL, channel, and network entry points.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use url::Url;

use crate::capture::RequestBody;

use super::channel::PageChannel;
use super::interceptor::{Interceptor, InterceptorPhase};
use super::primitives::{
    CallHandle, CallbackPrimitive, FetchRequest, FetchResponse, NetworkError, PromisePrimitive,
};

// ============================================================================
// Slots
// ============================================================================

/// The page's callback-style entry point.
pub(crate) type CallbackSlot = RwLock<Arc<dyn CallbackPrimitive>>;

/// The page's promise-style entry point.
pub(crate) type PromiseSlot = RwLock<Arc<dyn PromisePrimitive>>;

// ============================================================================
// PageContext
// ============================================================================

/// A loaded page.
///
/// Page code reaches the network only through [`open`](Self::open),
/// [`send`](Self::send) and [`fetch`](Self::fetch), which call whatever
/// currently occupies the page's slots. Clones share the page.
#[derive(Clone)]
pub struct PageContext {
    inner: Arc<PageInner>,
}

struct PageInner {
    url: Url,
    channel: PageChannel,
    callback: Arc<CallbackSlot>,
    promise: Arc<PromiseSlot>,
    /// Install marker; holds the interceptor once patched.
    interceptor: Mutex<Option<Interceptor>>,
    unloading: AtomicBool,
}

impl fmt::Debug for PageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageContext")
            .field("url", &self.inner.url.as_str())
            .field("phase", &self.interceptor_phase())
            .finish_non_exhaustive()
    }
}

impl PageContext {
    /// Creates a page with the given network primitives.
    #[must_use]
    pub fn new(
        url: Url,
        channel: PageChannel,
        callback: Arc<dyn CallbackPrimitive>,
        promise: Arc<dyn PromisePrimitive>,
    ) -> Self {
        Self {
            inner: Arc::new(PageInner {
                url,
                channel,
                callback: Arc::new(RwLock::new(callback)),
                promise: Arc::new(RwLock::new(promise)),
                interceptor: Mutex::new(None),
                unloading: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a page whose two primitives are served by one backend.
    #[must_use]
    pub fn with_network<N>(url: Url, channel: PageChannel, network: Arc<N>) -> Self
    where
        N: CallbackPrimitive + PromisePrimitive + 'static,
    {
        let callback: Arc<dyn CallbackPrimitive> = network.clone();
        let promise: Arc<dyn PromisePrimitive> = network;
        Self::new(url, channel, callback, promise)
    }

    /// Returns the page URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Returns the page channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &PageChannel {
        &self.inner.channel
    }

    /// Returns the current callback-style entry point.
    #[must_use]
    pub fn callback(&self) -> Arc<dyn CallbackPrimitive> {
        Arc::clone(&*self.inner.callback.read())
    }

    /// Returns the current promise-style entry point.
    #[must_use]
    pub fn promise(&self) -> Arc<dyn PromisePrimitive> {
        Arc::clone(&*self.inner.promise.read())
    }

    /// Returns `true` once [`begin_unload`](Self::begin_unload) ran.
    #[inline]
    #[must_use]
    pub fn is_unloading(&self) -> bool {
        self.inner.unloading.load(Ordering::Acquire)
    }
}

// ============================================================================
// PageContext - Page Code
// ============================================================================

impl PageContext {
    /// Opens a callback-style call through the page's entry point.
    ///
    /// # Errors
    ///
    /// Whatever the entry point reports.
    pub fn open(&self, call: &CallHandle, method: &str, url: &str) -> Result<(), NetworkError> {
        self.callback().open(call, method, url)
    }

    /// Sends a callback-style call through the page's entry point.
    ///
    /// # Errors
    ///
    /// Whatever the entry point reports.
    pub fn send(&self, call: &CallHandle, body: Option<RequestBody>) -> Result<(), NetworkError> {
        self.callback().send(call, body)
    }

    /// Performs a promise-style call through the page's entry point.
    ///
    /// # Errors
    ///
    /// Whatever the network reports.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, NetworkError> {
        let entry = self.promise();
        entry.fetch(request).await
    }

    /// Replaces the callback-style entry point with a wrapper of the current one.
    pub fn patch_callback<F>(&self, wrap: F)
    where
        F: FnOnce(Arc<dyn CallbackPrimitive>) -> Arc<dyn CallbackPrimitive>,
    {
        let mut slot = self.inner.callback.write();
        let current = Arc::clone(&*slot);
        *slot = wrap(current);
    }

    /// Replaces the promise-style entry point with a wrapper of the current one.
    pub fn patch_promise<F>(&self, wrap: F)
    where
        F: FnOnce(Arc<dyn PromisePrimitive>) -> Arc<dyn PromisePrimitive>,
    {
        let mut slot = self.inner.promise.write();
        let current = Arc::clone(&*slot);
        *slot = wrap(current);
    }
}

// ============================================================================
// PageContext - Interceptor
// ============================================================================

impl PageContext {
    /// Installs the interceptor unless the page is already patched or unloading.
    ///
    /// Returns `true` if this call installed it.
    pub fn install_interceptor(&self) -> bool {
        let mut marker = self.inner.interceptor.lock();
        if marker.is_some() {
            debug!(url = %self.inner.url, "Interceptor already installed");
            return false;
        }
        if self.is_unloading() {
            debug!(url = %self.inner.url, "Page unloading, interceptor not installed");
            return false;
        }

        let origin = Some(self.inner.url.clone());
        *marker = Some(Interceptor::install(
            &self.inner.channel,
            origin,
            &self.inner.callback,
            &self.inner.promise,
        ));
        true
    }

    /// Returns the interceptor's phase.
    #[must_use]
    pub fn interceptor_phase(&self) -> InterceptorPhase {
        self.inner
            .interceptor
            .lock()
            .as_ref()
            .map_or(InterceptorPhase::Uninstalled, Interceptor::phase)
    }

    /// Signals that the page is going away. Nothing is captured afterwards.
    pub fn begin_unload(&self) {
        if self.inner.unloading.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(url = %self.inner.url, "Page unloading");
        if let Some(interceptor) = self.inner.interceptor.lock().as_ref() {
            interceptor.begin_unload();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
