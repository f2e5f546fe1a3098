//! The page-adjacent relay.
//!
//! One relay runs per loaded page. It injects the interceptor, toggles it
//! over the page channel, forwards captures to the store owner in order,
//! and answers commands addressed to its tab.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `badge` | [`Badge`] counter display |
//! | `handshake` | [`Handshake`], deferred start delivery |

// ============================================================================
// Submodules
// ============================================================================

/// Counter display.
pub mod badge;

/// Deferred start delivery.
pub mod handshake;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::capture::CapturedExchange;
use crate::error::Error;
use crate::identifiers::TabId;
use crate::page::{ControlAction, InterceptorPhase, PageContext, PageListener, PageMessage};
use crate::protocol::{Message, MessageSender, NewCount, RelayCommand, Reply, TabStatus};
use crate::transport::{Envelope, RuntimeChannel, TabInbox, TabRouter};

// ============================================================================
// Re-exports
// ============================================================================

pub use badge::{Badge, MemoryBadge, NoBadge};
pub use handshake::Handshake;

// ============================================================================
// RelayContext
// ============================================================================

/// What a relay is wired to.
#[derive(Debug, Clone)]
pub struct RelayContext {
    /// The tab the page is loaded in.
    pub tab_id: TabId,
    /// The page.
    pub page: PageContext,
    /// Channel to the store owner.
    pub runtime: RuntimeChannel,
    /// Router the relay registers its command inbox with.
    pub tabs: TabRouter,
    /// Counter display.
    pub badge: Arc<dyn Badge>,
}

// ============================================================================
// Relay
// ============================================================================

#[derive(Debug, Default)]
struct LocalState {
    is_listening: bool,
    request_count: usize,
    handshake: Handshake,
}

#[derive(Debug)]
struct Shared {
    context: RelayContext,
    state: Mutex<LocalState>,
}

#[derive(Debug)]
struct RelayTasks {
    main: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

/// The relay of one page.
///
/// Dropping the relay stops its tasks and unregisters its tab route.
#[derive(Debug)]
pub struct Relay {
    shared: Arc<Shared>,
    tasks: Mutex<Option<RelayTasks>>,
}

impl Relay {
    /// Creates an uninstalled relay.
    #[must_use]
    pub fn new(context: RelayContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                context,
                state: Mutex::new(LocalState::default()),
            }),
            tasks: Mutex::new(None),
        }
    }

    /// Returns the relay's tab.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.shared.context.tab_id
    }

    /// Returns `true` once [`install`](Self::install) ran.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Returns the relay's local view of its tab.
    #[must_use]
    pub fn status(&self) -> TabStatus {
        self.shared.status()
    }

    /// Wires the relay to its page and starts it.
    ///
    /// Returns `false` if it was already installed.
    pub fn install(&self) -> bool {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return false;
        }

        let context = &self.shared.context;
        let tab_id = context.tab_id;

        // Listen before injecting so the readiness signal cannot be missed.
        let page_rx = context.page.channel().subscribe();
        let inbox = context.tabs.register(tab_id);

        let injected = context.page.install_interceptor();
        let already_listening = !injected
            && matches!(
                context.page.interceptor_phase(),
                InterceptorPhase::Inactive | InterceptorPhase::Active
            );
        if already_listening {
            self.shared.state.lock().handshake = Handshake::ready();
        }

        let (forward_tx, forward_rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(Arc::clone(&self.shared).forward(forward_rx));
        let main = tokio::spawn(Arc::clone(&self.shared).run(inbox, page_rx, forward_tx));

        debug!(tab_id = %tab_id, injected, "Relay installed");
        *tasks = Some(RelayTasks { main, forwarder });
        true
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.lock().take() {
            tasks.main.abort();
            tasks.forwarder.abort();
        }
    }
}

// ============================================================================
// Shared - Page Side
// ============================================================================

impl Shared {
    fn tab_id(&self) -> TabId {
        self.context.tab_id
    }

    fn sender(&self) -> MessageSender {
        MessageSender::tab(self.tab_id())
    }

    fn status(&self) -> TabStatus {
        let state = self.state.lock();
        TabStatus {
            is_listening: state.is_listening,
            request_count: state.request_count,
        }
    }

    fn post(&self, action: Option<ControlAction>) {
        if let Some(action) = action {
            trace!(tab_id = %self.tab_id(), ?action, "Posting control");
            self.context
                .page
                .channel()
                .post(PageMessage::Control { action });
        }
    }

    fn set_count(&self, count: usize) {
        self.state.lock().request_count = count;
        self.context.badge.set_count(self.tab_id(), count);
    }

    /// Applies the persisted state of the tab.
    async fn restore(&self) {
        let status = match self
            .context
            .runtime
            .request::<TabStatus>(Message::GetInitialState, self.sender())
            .await
        {
            Ok(status) => status,
            Err(e) => {
                debug!(tab_id = %self.tab_id(), error = %e, "Initial state unavailable");
                return;
            }
        };

        self.set_count(status.request_count);
        if status.is_listening {
            let action = {
                let mut state = self.state.lock();
                state.is_listening = true;
                state.handshake.request_start()
            };
            self.post(action);
        }
        debug!(
            tab_id = %self.tab_id(),
            listening = status.is_listening,
            count = status.request_count,
            "Relay state restored"
        );
    }

    fn on_ready(&self) {
        let action = self.state.lock().handshake.on_ready();
        trace!(tab_id = %self.tab_id(), "Interceptor ready");
        self.post(action);
    }

    fn on_capture(
        &self,
        exchange: CapturedExchange,
        forward: &mpsc::UnboundedSender<CapturedExchange>,
    ) {
        if !self.state.lock().is_listening {
            trace!(
                tab_id = %self.tab_id(),
                url = %exchange.url,
                "Not listening, capture ignored"
            );
            return;
        }
        if forward.send(exchange).is_err() {
            debug!(tab_id = %self.tab_id(), "Capture forwarder stopped");
        }
    }
}

// ============================================================================
// Shared - Commands
// ============================================================================

impl Shared {
    fn handle_command(&self, command: RelayCommand) -> Reply {
        trace!(tab_id = %self.tab_id(), ?command, "Relay command");
        match command {
            RelayCommand::StartListening => {
                let action = {
                    let mut state = self.state.lock();
                    state.is_listening = true;
                    state.handshake.request_start()
                };
                self.post(action);
                Reply::ok()
            }
            RelayCommand::StopListening => {
                let action = {
                    let mut state = self.state.lock();
                    state.is_listening = false;
                    state.handshake.request_stop()
                };
                self.post(action);
                Reply::ok()
            }
            RelayCommand::ClearRecords => {
                self.set_count(0);
                Reply::ok()
            }
            RelayCommand::GetStatus => Reply::from_result(Ok(self.status())),
        }
    }

    fn on_envelope(&self, envelope: Envelope<RelayCommand>) {
        let (command, _, responder) = envelope.into_parts();
        let reply = self.handle_command(command);
        responder.send(reply);
    }
}

// ============================================================================
// Shared - Tasks
// ============================================================================

impl Shared {
    async fn run(
        self: Arc<Self>,
        mut inbox: TabInbox,
        mut page_rx: PageListener,
        forward: mpsc::UnboundedSender<CapturedExchange>,
    ) {
        self.restore().await;

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.on_envelope(envelope),
                    None => break,
                },

                message = page_rx.recv() => match message {
                    Some(PageMessage::Captured { payload }) => self.on_capture(payload, &forward),
                    Some(PageMessage::Ready) => self.on_ready(),
                    Some(PageMessage::Control { .. }) => {}
                    None => break,
                },
            }
        }

        debug!(tab_id = %self.tab_id(), "Relay stopped");
    }

    /// Stores captures one at a time, in arrival order.
    async fn forward(self: Arc<Self>, mut captures: mpsc::UnboundedReceiver<CapturedExchange>) {
        while let Some(data) = captures.recv().await {
            let url = data.url.clone();
            let message = Message::StoreRequest { data, tab_id: None };
            match self
                .context
                .runtime
                .request::<NewCount>(message, self.sender())
                .await
            {
                Ok(NewCount { new_count }) => {
                    trace!(tab_id = %self.tab_id(), url = %url, count = new_count, "Capture stored");
                    self.set_count(new_count);
                }
                Err(e @ (Error::NoReceiver | Error::ChannelClosed(_))) => {
                    debug!(tab_id = %self.tab_id(), error = %e, "Store owner unavailable");
                }
                Err(e) => {
                    warn!(tab_id = %self.tab_id(), url = %url, error = %e, "Failed to store capture");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
