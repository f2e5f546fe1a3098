//! The store owner: sole writer of captured records.
//!
//! The owner runs one event loop over three inputs:
//!
//! - runtime messages from relays and observers (each handled in its own task),
//! - tab lifecycle notifications from the host,
//! - the storage change feed, to notice logs cleared by observers.
//!
//! State changes are announced on the [`BroadcastBus`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::bus::BroadcastBus;
use crate::capture::{CaptureRecord, CapturedExchange};
use crate::error::{Error, Result};
use crate::host::{HostEvent, HostTabs};
use crate::identifiers::TabId;
use crate::observer::ViewerLocation;
use crate::protocol::{
    Broadcast, Message, MessageSender, NewCount, Reply, StoredRequests, TabStatus, TabTitle,
};
use crate::transport::{Envelope, RuntimeInbox};

use super::area::StorageChange;
use super::tab_store::{TabStore, parse_log_key};

// ============================================================================
// StoreOwner
// ============================================================================

/// Owner of the durable per-tab state.
///
/// Cheap to clone; clones share the tombstone set and the tab locks.
#[derive(Debug, Clone)]
pub struct StoreOwner {
    tabs: TabStore,
    bus: BroadcastBus,
    host: Arc<dyn HostTabs>,
    /// Tabs closed during this session. Late writes for them are refused.
    closed: Arc<RwLock<FxHashSet<TabId>>>,
    viewer_page: Arc<str>,
}

impl StoreOwner {
    /// Creates an owner over the given store, bus and host.
    #[must_use]
    pub fn new(
        tabs: TabStore,
        bus: BroadcastBus,
        host: Arc<dyn HostTabs>,
        viewer_page: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            tabs,
            bus,
            host,
            closed: Arc::new(RwLock::new(FxHashSet::default())),
            viewer_page: viewer_page.into(),
        }
    }

    /// Returns the tab store.
    #[inline]
    #[must_use]
    pub fn tabs(&self) -> &TabStore {
        &self.tabs
    }

    fn is_closed(&self, tab_id: TabId) -> bool {
        self.closed.read().contains(&tab_id)
    }
}

// ============================================================================
// StoreOwner - Operations
// ============================================================================

impl StoreOwner {
    /// Stamps and appends a captured exchange, then announces the new count.
    ///
    /// # Errors
    ///
    /// - [`Error::TabGone`] if the tab was closed
    /// - storage failures, with the log unchanged
    pub async fn store_request(&self, tab_id: TabId, exchange: CapturedExchange) -> Result<usize> {
        if self.is_closed(tab_id) {
            debug!(tab_id = %tab_id, "Refusing capture for closed tab");
            return Err(Error::tab_gone(tab_id));
        }

        let record = CaptureRecord::stamp_now(exchange);
        let record_id = record.id.clone();
        // Counts go out under the tab lock so observers see them in append order.
        let count = self
            .tabs
            .append_with(tab_id, record, |count| {
                if !self.is_closed(tab_id) {
                    self.bus.publish(Broadcast::UpdateCount { count, tab_id });
                }
            })
            .await?;

        // The tab may have closed while the append waited for its lock.
        if self.is_closed(tab_id) {
            self.tabs.remove_tab(tab_id).await?;
            return Err(Error::tab_gone(tab_id));
        }

        trace!(tab_id = %tab_id, record_id = %record_id, count, "Capture stored");
        Ok(count)
    }

    /// Removes stored state of tabs the host no longer reports.
    ///
    /// Tab ids do not survive a host restart, so state kept from an earlier
    /// run cannot be claimed by any tab. Preferences are kept.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn reclaim_orphans(&self) -> Result<usize> {
        let reclaimed = self
            .tabs
            .remove_orphans(|tab_id| self.host.title(tab_id).is_some())
            .await?;
        if reclaimed > 0 {
            info!(reclaimed, "Reclaimed state of closed tabs");
        }
        Ok(reclaimed)
    }

    /// Returns `{isListening, requestCount}` for the tab.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn get_tab_state(&self, tab_id: TabId) -> Result<TabStatus> {
        self.tabs.tab_status(tab_id).await
    }

    /// Returns the tab's log in append order.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn get_stored_requests(&self, tab_id: TabId) -> Result<Vec<CaptureRecord>> {
        self.tabs.read_log(tab_id).await
    }

    /// Returns the tab's current title.
    ///
    /// # Errors
    ///
    /// [`Error::TabGone`] if the host has no such tab.
    pub fn get_tab_title(&self, tab_id: TabId) -> Result<String> {
        self.host.title(tab_id).ok_or_else(|| Error::tab_gone(tab_id))
    }

    /// Opens the inspector view for the tab.
    ///
    /// # Errors
    ///
    /// Propagates host failures.
    pub fn open_viewer(
        &self,
        tab_id: TabId,
        tab_title: Option<String>,
        index: Option<u32>,
    ) -> Result<ViewerLocation> {
        let title = tab_title
            .or_else(|| self.host.title(tab_id))
            .unwrap_or_default();
        let location = ViewerLocation::for_tab(&*self.viewer_page, tab_id, title)
            .with_index(index);

        self.host.open_viewer(&location)?;
        info!(tab_id = %tab_id, url = %location, "Viewer opened");
        Ok(location)
    }

    /// Tears down a closed tab: log and flag removed in one operation.
    pub async fn on_tab_closed(&self, tab_id: TabId) {
        self.closed.write().insert(tab_id);

        match self.tabs.remove_tab(tab_id).await {
            Ok(()) => debug!(tab_id = %tab_id, "Closed tab data removed"),
            Err(e) => error!(tab_id = %tab_id, error = %e, "Failed to remove closed tab data"),
        }
        self.tabs.forget_tab(tab_id);
    }

    /// Clears the tombstone of a tab opened again under the same ID.
    pub fn on_tab_created(&self, tab_id: TabId) {
        if self.closed.write().remove(&tab_id) {
            debug!(tab_id = %tab_id, "Tab reopened, tombstone cleared");
        }
    }

    /// Announces a title change.
    pub fn on_title_changed(&self, tab_id: TabId, title: String) {
        self.bus.publish(Broadcast::TitleUpdated {
            tab_id,
            new_title: title,
        });
    }

    /// Announces logs removed from storage by someone other than teardown.
    pub fn on_storage_changes(&self, changes: &[StorageChange]) {
        for change in changes.iter().filter(|c| c.is_removal()) {
            let Some(tab_id) = parse_log_key(&change.key) else {
                continue;
            };
            if self.is_closed(tab_id) {
                continue;
            }
            debug!(tab_id = %tab_id, "Log cleared");
            self.bus.publish(Broadcast::RecordsCleared { tab_id });
        }
    }
}

// ============================================================================
// StoreOwner - Message Handling
// ============================================================================

impl StoreOwner {
    /// Handles one runtime message and builds its reply.
    pub async fn handle_message(&self, message: Message, sender: MessageSender) -> Reply {
        let action = message.action();
        let reply = match self.dispatch(message, sender).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(action, error = %e, "Runtime message failed");
                Reply::failure(e)
            }
        };
        trace!(action, success = reply.success, "Runtime message handled");
        reply
    }

    async fn dispatch(&self, message: Message, sender: MessageSender) -> Result<Reply> {
        let tab_id = message.target(&sender)?;

        match message {
            Message::StoreRequest { data, .. } => {
                let new_count = self.store_request(tab_id, data).await?;
                Reply::with(&NewCount { new_count })
            }
            Message::GetPopupState { .. } | Message::GetInitialState => {
                Reply::with(&self.get_tab_state(tab_id).await?)
            }
            Message::GetStoredRequests { .. } => {
                let data = self.get_stored_requests(tab_id).await?;
                Reply::with(&StoredRequests { data })
            }
            Message::GetTabTitle { .. } => {
                let title = self.get_tab_title(tab_id)?;
                Reply::with(&TabTitle { title })
            }
            Message::OpenViewer {
                tab_title, index, ..
            } => {
                self.open_viewer(tab_id, tab_title, index)?;
                Ok(Reply::ok())
            }
        }
    }

    fn handle_envelope(&self, envelope: Envelope<Message>) {
        let owner = self.clone();
        tokio::spawn(async move {
            let (message, sender, responder) = envelope.into_parts();
            let reply = owner.handle_message(message, sender).await;
            responder.send(reply);
        });
    }

    async fn handle_host_event(&self, event: HostEvent) {
        match event {
            HostEvent::TabCreated { tab_id } => self.on_tab_created(tab_id),
            HostEvent::TabRemoved { tab_id } => self.on_tab_closed(tab_id).await,
            HostEvent::TitleChanged { tab_id, title } => self.on_title_changed(tab_id, title),
        }
    }
}

// ============================================================================
// StoreOwner - Event Loop
// ============================================================================

impl StoreOwner {
    /// Spawns the event loop.
    #[must_use]
    pub fn spawn(self, inbox: RuntimeInbox) -> JoinHandle<()> {
        tokio::spawn(self.run(inbox))
    }

    /// Runs the event loop until every runtime sender is gone.
    pub async fn run(self, mut inbox: RuntimeInbox) {
        let mut host_events = self.host.subscribe();
        let mut changes = self.tabs.area().subscribe();
        let mut host_open = true;
        let mut changes_open = true;

        debug!("Store owner started");

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.handle_envelope(envelope),
                    None => break,
                },

                event = host_events.recv(), if host_open => match event {
                    Some(event) => self.handle_host_event(event).await,
                    None => host_open = false,
                },

                batch = changes.recv(), if changes_open => match batch {
                    Some(batch) => self.on_storage_changes(&batch),
                    None => changes_open = false,
                },
            }
        }

        debug!("Store owner stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================
