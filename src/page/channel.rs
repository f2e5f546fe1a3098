//! The page's event channel.
//!
//! Every listener in the page hears every message posted to it, its own
//! included; listeners ignore types they do not handle. Nothing is dropped:
//! each listener has its own unbounded queue, filled in post order.
//!
//! | Type | Fields | Direction |
//! |------|--------|-----------|
//! | `monitor.control` | `action: start \| stop` | Relay → Interceptor |
//! | `monitor.captured` | `payload` | Interceptor → Relay |
//! | `monitor.ready` | | Interceptor → Relay |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::trace;

use crate::capture::CapturedExchange;

// ============================================================================
// PageMessage
// ============================================================================

/// Capture control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Begin capturing.
    Start,
    /// Stop capturing.
    Stop,
}

/// A message on the page channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    /// Toggle capture.
    #[serde(rename = "monitor.control")]
    Control {
        /// What to do.
        action: ControlAction,
    },

    /// One captured exchange.
    #[serde(rename = "monitor.captured")]
    Captured {
        /// The exchange.
        payload: CapturedExchange,
    },

    /// The interceptor is installed and listening for control messages.
    #[serde(rename = "monitor.ready")]
    Ready,
}

impl PageMessage {
    /// Returns the `type` discriminator.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Control { .. } => "monitor.control",
            Self::Captured { .. } => "monitor.captured",
            Self::Ready => "monitor.ready",
        }
    }
}

// ============================================================================
// PageChannel
// ============================================================================

/// Channel shared by everything running in one page.
#[derive(Debug, Clone, Default)]
pub struct PageChannel {
    listeners: Arc<Mutex<Vec<mpsc::UnboundedSender<PageMessage>>>>,
}

impl PageChannel {
    /// Creates a channel with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts a message to every listener. Returns how many heard it.
    ///
    /// Listeners whose receiving end is gone are pruned.
    pub fn post(&self, message: PageMessage) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(message.clone()).is_ok());

        let heard = listeners.len();
        if heard == 0 {
            trace!(kind = message.kind(), "Page message had no listeners");
        }
        heard
    }

    /// Adds a listener. It hears every message posted from now on.
    #[must_use]
    pub fn subscribe(&self) -> PageListener {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().push(tx);
        PageListener { rx }
    }

    /// Returns the number of listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

// ============================================================================
// PageListener
// ============================================================================

/// One listener's queue of page messages.
#[derive(Debug)]
pub struct PageListener {
    rx: mpsc::UnboundedReceiver<PageMessage>,
}

impl PageListener {
    /// Waits for the next message. Returns `None` once the page is gone.
    pub async fn recv(&mut self) -> Option<PageMessage> {
        self.rx.recv().await
    }

    /// Takes the next message if one is queued.
    ///
    /// # Errors
    ///
    /// [`TryRecvError::Empty`] if nothing is queued,
    /// [`TryRecvError::Disconnected`] once the page is gone.
    pub fn try_recv(&mut self) -> Result<PageMessage, TryRecvError> {
        self.rx.try_recv()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_control_wire_form() {
        let message = PageMessage::Control {
            action: ControlAction::Start,
        };
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value, json!({ "type": "monitor.control", "action": "start" }));
    }

    #[test]
    fn test_ready_wire_form() {
        let value = serde_json::to_value(PageMessage::Ready).expect("serialize");
        assert_eq!(value, json!({ "type": "monitor.ready" }));
    }

    #[test]
    fn test_post_without_listeners() {
        let channel = PageChannel::new();
        assert_eq!(channel.post(PageMessage::Ready), 0);
    }

    #[tokio::test]
    async fn test_every_listener_hears() {
        let channel = PageChannel::new();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();
        assert_eq!(channel.post(PageMessage::Ready), 2);
        assert_eq!(a.recv().await, Some(PageMessage::Ready));
        assert_eq!(b.recv().await, Some(PageMessage::Ready));
    }

    #[test]
    fn test_dropped_listener_pruned() {
        let channel = PageChannel::new();
        let kept = channel.subscribe();
        drop(channel.subscribe());

        assert_eq!(channel.post(PageMessage::Ready), 1);
        assert_eq!(channel.listener_count(), 1);
        drop(kept);
    }

    #[test]
    fn test_burst_is_not_dropped() {
        let channel = PageChannel::new();
        let mut rx = channel.subscribe();
        for _ in 0..5000 {
            channel.post(PageMessage::Captured {
                payload: CapturedExchange {
                    url: "/a".to_string(),
                    method: "GET".to_string(),
                    params: Default::default(),
                    response: Default::default(),
                },
            });
        }
        channel.post(PageMessage::Ready);

        let mut received = 0;
        while let Ok(message) = rx.try_recv() {
            received += 1;
            if received == 5001 {
                assert_eq!(message, PageMessage::Ready);
            }
        }
        assert_eq!(received, 5001);
    }
}
