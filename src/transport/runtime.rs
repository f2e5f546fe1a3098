//! Request/reply channel to the store owner.
//!
//! Every relay and observer holds a clone of [`RuntimeChannel`]. The store
//! owner holds the single [`RuntimeInbox`]. Envelopes from one sender arrive
//! in the order they were sent.

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{Message, MessageSender, Reply};

use super::Envelope;

// ============================================================================
// RuntimeChannel
// ============================================================================

/// Sending half of the runtime channel.
#[derive(Debug, Clone)]
pub struct RuntimeChannel {
    tx: mpsc::UnboundedSender<Envelope<Message>>,
}

/// Receiving half of the runtime channel, owned by the store owner.
#[derive(Debug)]
pub struct RuntimeInbox {
    rx: mpsc::UnboundedReceiver<Envelope<Message>>,
}

impl RuntimeChannel {
    /// Creates a connected channel pair.
    #[must_use]
    pub fn new() -> (Self, RuntimeInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, RuntimeInbox { rx })
    }

    /// Sends a message and waits for the reply.
    ///
    /// # Errors
    ///
    /// - [`Error::NoReceiver`] if the store owner is not running
    /// - [`Error::ChannelClosed`] if it dropped the request unanswered
    pub async fn send(&self, message: Message, sender: MessageSender) -> Result<Reply> {
        let action = message.action();
        let (envelope, reply_rx) = Envelope::request(message, sender);

        self.tx.send(envelope).map_err(|_| {
            trace!(action, "Runtime message has no receiver");
            Error::NoReceiver
        })?;

        Ok(reply_rx.await?)
    }

    /// Sends a message and decodes the successful reply payload.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send), plus [`Error::Rejected`] for a failed
    /// reply and [`Error::Json`] for a payload of the wrong shape.
    pub async fn request<T: DeserializeOwned>(
        &self,
        message: Message,
        sender: MessageSender,
    ) -> Result<T> {
        self.send(message, sender).await?.decode()
    }

    /// Sends a message without waiting for a reply.
    ///
    /// # Errors
    ///
    /// [`Error::NoReceiver`] if the store owner is not running.
    pub fn post(&self, message: Message, sender: MessageSender) -> Result<()> {
        let action = message.action();
        self.tx
            .send(Envelope::post(message, sender))
            .map_err(|_| {
                trace!(action, "Runtime message has no receiver");
                Error::NoReceiver
            })
    }

    /// Returns `true` if the store owner has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl RuntimeInbox {
    /// Receives the next envelope. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Envelope<Message>> {
        self.rx.recv().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::TabStatus;

    #[tokio::test]
    async fn test_send_receives_reply() {
        let (channel, mut inbox) = RuntimeChannel::new();

        tokio::spawn(async move {
            let envelope = inbox.recv().await.expect("envelope");
            let (message, _, responder) = envelope.into_parts();
            assert_eq!(message, Message::GetInitialState);
            let status = TabStatus {
                is_listening: true,
                request_count: 2,
            };
            responder.send(Reply::from_result(Ok(status)));
        });

        let status: TabStatus = channel
            .request(Message::GetInitialState, MessageSender::extension())
            .await
            .expect("reply");
        assert!(status.is_listening);
        assert_eq!(status.request_count, 2);
    }

    #[tokio::test]
    async fn test_send_without_receiver() {
        let (channel, inbox) = RuntimeChannel::new();
        drop(inbox);

        let result = channel
            .send(Message::GetInitialState, MessageSender::extension())
            .await;
        assert!(matches!(result, Err(Error::NoReceiver)));
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_unanswered_request() {
        let (channel, mut inbox) = RuntimeChannel::new();

        tokio::spawn(async move {
            let envelope = inbox.recv().await.expect("envelope");
            drop(envelope);
        });

        let result = channel
            .send(Message::GetInitialState, MessageSender::extension())
            .await;
        assert!(matches!(result, Err(Error::ChannelClosed(_))));
    }

    #[tokio::test]
    async fn test_post_preserves_order() {
        let (channel, mut inbox) = RuntimeChannel::new();
        for id in 1..=3 {
            let tab_id = crate::identifiers::TabId::new(id);
            channel
                .post(Message::GetTabTitle { tab_id }, MessageSender::extension())
                .expect("post");
        }

        for id in 1..=3 {
            let envelope = inbox.recv().await.expect("envelope");
            assert!(!envelope.expects_reply());
            assert_eq!(envelope.message.tab_id().map(|t| t.as_u32()), Some(id));
        }
    }
}
