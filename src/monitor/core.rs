//! Monitor coordinator.
//!
//! The [`Monitor`] wires the store owner, the host registry and the bus
//! together, and opens pages with their relays.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use url::Url;
//! use xhr_monitor::{LoopbackNetwork, Monitor, TabId};
//!
//! # async fn example() -> xhr_monitor::Result<()> {
//! let monitor = Monitor::builder().build().await?;
//! let url = Url::parse("https://shop.test/").expect("url");
//! let network = Arc::new(LoopbackNetwork::new(url.clone()));
//!
//! let tab_id = TabId::new(7).expect("tab id");
//! let session = monitor.open_tab(tab_id, "Shop", url, network);
//! monitor.inspector().start_listening(tab_id).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::mem;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::bus::BroadcastBus;
use crate::error::Result;
use crate::host::{HostTabRegistry, HostTabs};
use crate::identifiers::TabId;
use crate::observer::Inspector;
use crate::page::{CallbackPrimitive, PageChannel, PageContext, PromisePrimitive};
use crate::relay::{Badge, Relay, RelayContext};
use crate::store::{StorageArea, StoreOwner, TabStore};
use crate::transport::{RuntimeChannel, TabRouter};

use super::builder::MonitorBuilder;
use super::options::MonitorOptions;

// ============================================================================
// Types
// ============================================================================

struct MonitorInner {
    options: MonitorOptions,
    host: Arc<HostTabRegistry>,
    store: TabStore,
    bus: BroadcastBus,
    runtime: RuntimeChannel,
    relays: TabRouter,
    badge: Arc<dyn Badge>,
    owner: StoreOwner,
    owner_task: JoinHandle<()>,
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.owner_task.abort();
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Capture monitor for a set of host tabs.
///
/// Cheap to clone; clones share the store owner.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("options", &self.inner.options)
            .field("relay_count", &self.inner.relays.route_count())
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
    }

    /// Reclaims state left by tabs of an earlier run, then starts the owner.
    ///
    /// # Errors
    ///
    /// Propagates storage failures from the reclaim.
    pub(crate) async fn start(
        options: MonitorOptions,
        area: Arc<dyn StorageArea>,
        badge: Arc<dyn Badge>,
    ) -> Result<Self> {
        let store = TabStore::new(area);
        let bus = BroadcastBus::new();
        let host = Arc::new(HostTabRegistry::new());
        let (runtime, inbox) = RuntimeChannel::new();

        let host_tabs: Arc<dyn HostTabs> = host.clone();
        let owner = StoreOwner::new(
            store.clone(),
            bus.clone(),
            host_tabs,
            &*options.viewer_page,
        );
        // No host tab is open yet, so every stored tab is an orphan.
        owner.reclaim_orphans().await?;
        let owner_task = owner.clone().spawn(inbox);

        info!(durable = options.is_durable(), "Monitor started");

        Ok(Self {
            inner: Arc::new(MonitorInner {
                options,
                host,
                store,
                bus,
                runtime,
                relays: TabRouter::new(),
                badge,
                owner,
                owner_task,
            }),
        })
    }

    /// Returns the options the monitor was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &MonitorOptions {
        &self.inner.options
    }

    /// Returns the host tab registry.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &Arc<HostTabRegistry> {
        &self.inner.host
    }

    /// Returns the tab store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &TabStore {
        &self.inner.store
    }

    /// Returns the store owner.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &StoreOwner {
        &self.inner.owner
    }

    /// Creates an observer handle.
    #[must_use]
    pub fn inspector(&self) -> Inspector {
        let host: Arc<dyn HostTabs> = self.inner.host.clone();
        Inspector::new(
            self.inner.runtime.clone(),
            self.inner.relays.clone(),
            self.inner.store.clone(),
            self.inner.bus.clone(),
            host,
        )
    }
}

// ============================================================================
// Monitor - Tabs
// ============================================================================

impl Monitor {
    /// Opens a host tab and loads `url` in it with a relay attached.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open_tab<N>(
        &self,
        tab_id: TabId,
        title: impl Into<String>,
        url: Url,
        network: Arc<N>,
    ) -> TabSession
    where
        N: CallbackPrimitive + PromisePrimitive + 'static,
    {
        self.inner.host.open_tab(tab_id, title);
        self.inner.owner.on_tab_created(tab_id);

        let callback: Arc<dyn CallbackPrimitive> = network.clone();
        let promise: Arc<dyn PromisePrimitive> = network;
        let (page, relay) = self.load(tab_id, url, &callback, &promise);

        TabSession {
            tab_id,
            page,
            relay,
            callback,
            promise,
            monitor: self.clone(),
        }
    }

    /// Closes the session's tab and waits for its data to be removed.
    pub async fn close_tab(&self, session: TabSession) {
        let tab_id = session.tab_id;
        drop(session);

        self.inner.host.close_tab(tab_id);
        self.inner.owner.on_tab_closed(tab_id).await;
        debug!(tab_id = %tab_id, "Tab closed");
    }

    fn load(
        &self,
        tab_id: TabId,
        url: Url,
        callback: &Arc<dyn CallbackPrimitive>,
        promise: &Arc<dyn PromisePrimitive>,
    ) -> (PageContext, Relay) {
        let channel = PageChannel::new();
        let page = PageContext::new(url, channel, Arc::clone(callback), Arc::clone(promise));

        let relay = Relay::new(RelayContext {
            tab_id,
            page: page.clone(),
            runtime: self.inner.runtime.clone(),
            tabs: self.inner.relays.clone(),
            badge: Arc::clone(&self.inner.badge),
        });
        relay.install();
        debug!(tab_id = %tab_id, url = %page.url(), "Page loaded");

        (page, relay)
    }
}

// ============================================================================
// TabSession
// ============================================================================

/// A host tab with its current page and relay.
///
/// Dropping the session unloads the page and stops the relay; the host tab
/// stays open until [`Monitor::close_tab`].
pub struct TabSession {
    tab_id: TabId,
    page: PageContext,
    relay: Relay,
    callback: Arc<dyn CallbackPrimitive>,
    promise: Arc<dyn PromisePrimitive>,
    monitor: Monitor,
}

impl fmt::Debug for TabSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabSession")
            .field("tab_id", &self.tab_id)
            .field("page", &self.page)
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}

impl TabSession {
    /// Returns the tab.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Returns the current page.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// Returns the current relay.
    #[inline]
    #[must_use]
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Unloads the current page and loads `url` with a fresh relay.
    ///
    /// The new relay restores the listening state and count from storage.
    pub fn navigate(&mut self, url: Url) {
        self.page.begin_unload();

        let (page, relay) = self
            .monitor
            .load(self.tab_id, url, &self.callback, &self.promise);
        let old_relay = mem::replace(&mut self.relay, relay);
        self.page = page;
        drop(old_relay);

        debug!(tab_id = %self.tab_id, url = %self.page.url(), "Tab navigated");
    }
}

impl Drop for TabSession {
    fn drop(&mut self) {
        self.page.begin_unload();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::page::{InterceptorPhase, LoopbackNetwork};

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("tab")
    }

    fn shop() -> (Url, Arc<LoopbackNetwork>) {
        let url = Url::parse("http://shop.test/").expect("url");
        (url.clone(), Arc::new(LoopbackNetwork::new(url)))
    }

    #[tokio::test]
    async fn test_open_tab_registers_host_and_relay() {
        let monitor = Monitor::builder().build().await.expect("build");
        let (url, network) = shop();
        let session = monitor.open_tab(tab(1), "Shop", url, network);

        assert!(monitor.host().contains(tab(1)));
        assert!(session.relay().is_installed());
        assert_eq!(session.page().interceptor_phase(), InterceptorPhase::Inactive);
    }

    #[tokio::test]
    async fn test_navigate_unloads_old_page() {
        let monitor = Monitor::builder().build().await.expect("build");
        let (url, network) = shop();
        let mut session = monitor.open_tab(tab(2), "Shop", url, network);
        let old_page = session.page().clone();

        session.navigate(Url::parse("http://shop.test/checkout").expect("url"));

        assert!(old_page.is_unloading());
        assert!(!session.page().is_unloading());
        assert_eq!(session.page().url().path(), "/checkout");
    }

    #[tokio::test]
    async fn test_close_tab_removes_host_tab() {
        let monitor = Monitor::builder().build().await.expect("build");
        let (url, network) = shop();
        let session = monitor.open_tab(tab(3), "Shop", url, network);
        let page = session.page().clone();

        monitor.close_tab(session).await;
        assert!(!monitor.host().contains(tab(3)));
        assert!(page.is_unloading());
    }
}
