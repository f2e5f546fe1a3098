//! Request/reply routing to the relay of a given tab.
//!
//! Each live relay registers one route. A route is keyed by tab and
//! carries a generation so that a relay rebuilt after navigation is never
//! unregistered by its predecessor's late drop.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              TabRouter                  │
//! │  TabId=3 → (gen 1) relay of tab 3       │
//! │  TabId=7 → (gen 4) relay of tab 7       │
//! └─────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::{MessageSender, RelayCommand, Reply};

use super::Envelope;

// ============================================================================
// Types
// ============================================================================

type RouteMap = FxHashMap<TabId, RouteEntry>;

#[derive(Debug)]
struct RouteEntry {
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope<RelayCommand>>,
}

// ============================================================================
// TabRouter
// ============================================================================

/// Routes relay commands to the relay living in a tab.
///
/// Cheap to clone; clones share the route table.
#[derive(Debug, Clone, Default)]
pub struct TabRouter {
    routes: Arc<RwLock<RouteMap>>,
    next_generation: Arc<AtomicU64>,
}

impl TabRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the relay of `tab_id`, replacing any previous route.
    ///
    /// The route lives as long as the returned inbox.
    #[must_use]
    pub fn register(&self, tab_id: TabId) -> TabInbox {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let previous = self
            .routes
            .write()
            .insert(tab_id, RouteEntry { generation, tx });

        debug!(
            tab_id = %tab_id,
            generation,
            replaced = previous.is_some(),
            "Relay route registered"
        );

        TabInbox {
            tab_id,
            generation,
            rx,
            router: self.clone(),
        }
    }

    /// Returns `true` if a live relay is registered for the tab.
    #[must_use]
    pub fn is_reachable(&self, tab_id: TabId) -> bool {
        self.routes
            .read()
            .get(&tab_id)
            .is_some_and(|entry| !entry.tx.is_closed())
    }

    /// Returns the number of registered routes.
    #[inline]
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Sends a command to the tab's relay and waits for its reply.
    ///
    /// # Errors
    ///
    /// [`Error::TabUnreachable`] if no relay is registered for the tab or
    /// it went away before answering.
    pub async fn send(&self, tab_id: TabId, command: RelayCommand) -> Result<Reply> {
        let (envelope, reply_rx) = Envelope::request(command, MessageSender::extension());
        self.deliver(tab_id, envelope)?;

        reply_rx.await.map_err(|_| {
            debug!(tab_id = %tab_id, ?command, "Relay dropped command unanswered");
            Error::tab_unreachable(tab_id)
        })
    }

    /// Sends a command without waiting for a reply.
    ///
    /// # Errors
    ///
    /// [`Error::TabUnreachable`] if no relay is registered for the tab.
    pub fn post(&self, tab_id: TabId, command: RelayCommand) -> Result<()> {
        self.deliver(tab_id, Envelope::post(command, MessageSender::extension()))
    }

    fn deliver(&self, tab_id: TabId, envelope: Envelope<RelayCommand>) -> Result<()> {
        let command = envelope.message;
        let routes = self.routes.read();
        let entry = routes.get(&tab_id).ok_or_else(|| {
            trace!(tab_id = %tab_id, ?command, "No relay route for tab");
            Error::tab_unreachable(tab_id)
        })?;

        entry.tx.send(envelope).map_err(|_| {
            trace!(tab_id = %tab_id, ?command, "Relay route closed");
            Error::tab_unreachable(tab_id)
        })
    }

    fn unregister(&self, tab_id: TabId, generation: u64) {
        let mut routes = self.routes.write();
        if routes.get(&tab_id).is_some_and(|e| e.generation == generation) {
            routes.remove(&tab_id);
            debug!(tab_id = %tab_id, generation, "Relay route removed");
        }
    }
}

// ============================================================================
// TabInbox
// ============================================================================

/// Receiving end of one tab's route. Unregisters the route on drop.
#[derive(Debug)]
pub struct TabInbox {
    tab_id: TabId,
    generation: u64,
    rx: mpsc::UnboundedReceiver<Envelope<RelayCommand>>,
    router: TabRouter,
}

impl TabInbox {
    /// Returns the tab this inbox serves.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Receives the next command.
    pub async fn recv(&mut self) -> Option<Envelope<RelayCommand>> {
        self.rx.recv().await
    }
}

impl Drop for TabInbox {
    fn drop(&mut self) {
        self.router.unregister(self.tab_id, self.generation);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("valid tab id")
    }

    #[tokio::test]
    async fn test_send_to_registered_relay() {
        let router = TabRouter::new();
        let mut inbox = router.register(tab(7));

        tokio::spawn(async move {
            let envelope = inbox.recv().await.expect("command");
            let (command, _, responder) = envelope.into_parts();
            assert_eq!(command, RelayCommand::GetStatus);
            responder.send(Reply::ok());
        });

        let reply = router.send(tab(7), RelayCommand::GetStatus).await.expect("reply");
        assert!(reply.success);
    }

    #[tokio::test]
    async fn test_send_to_missing_tab() {
        let router = TabRouter::new();
        let result = router.send(tab(3), RelayCommand::StartListening).await;
        assert!(matches!(result, Err(Error::TabUnreachable { tab_id }) if tab_id == tab(3)));
    }

    #[test]
    fn test_drop_unregisters() {
        let router = TabRouter::new();
        let inbox = router.register(tab(1));
        assert!(router.is_reachable(tab(1)));
        drop(inbox);
        assert!(!router.is_reachable(tab(1)));
        assert_eq!(router.route_count(), 0);
    }

    #[test]
    fn test_stale_inbox_keeps_newer_route() {
        let router = TabRouter::new();
        let old = router.register(tab(1));
        let _new = router.register(tab(1));
        drop(old);
        assert!(router.is_reachable(tab(1)));
    }

    #[tokio::test]
    async fn test_unanswered_command_is_unreachable() {
        let router = TabRouter::new();
        let mut inbox = router.register(tab(2));

        tokio::spawn(async move {
            let envelope = inbox.recv().await.expect("command");
            drop(envelope);
        });

        let result = router.send(tab(2), RelayCommand::StopListening).await;
        assert!(matches!(result, Err(Error::TabUnreachable { .. })));
    }
}
