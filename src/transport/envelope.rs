//! Message envelope carrying sender metadata and a reply slot.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::oneshot;
use tracing::trace;

use crate::protocol::{MessageSender, Reply};

// ============================================================================
// Envelope
// ============================================================================

/// A message in flight between two contexts.
///
/// The receiver answers through the [`Responder`] obtained from
/// [`Envelope::into_parts`]. Posted envelopes carry no reply slot.
#[derive(Debug)]
pub struct Envelope<M> {
    /// The message.
    pub message: M,
    /// Who sent it.
    pub sender: MessageSender,
    reply_tx: Option<oneshot::Sender<Reply>>,
}

impl<M> Envelope<M> {
    /// Creates an envelope whose sender awaits a reply.
    pub(crate) fn request(message: M, sender: MessageSender) -> (Self, oneshot::Receiver<Reply>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Self {
            message,
            sender,
            reply_tx: Some(reply_tx),
        };
        (envelope, reply_rx)
    }

    /// Creates a fire-and-forget envelope.
    pub(crate) fn post(message: M, sender: MessageSender) -> Self {
        Self {
            message,
            sender,
            reply_tx: None,
        }
    }

    /// Returns `true` if the sender awaits a reply.
    #[inline]
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.reply_tx.is_some()
    }

    /// Splits the envelope into its message, sender and reply slot.
    #[must_use]
    pub fn into_parts(self) -> (M, MessageSender, Responder) {
        (self.message, self.sender, Responder(self.reply_tx))
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Reply slot of an [`Envelope`].
///
/// Dropping it unanswered closes the sender's reply channel.
#[derive(Debug)]
pub struct Responder(Option<oneshot::Sender<Reply>>);

impl Responder {
    /// Sends the reply. Returns `false` if nobody is waiting for it.
    pub fn send(self, reply: Reply) -> bool {
        match self.0 {
            Some(tx) => {
                let delivered = tx.send(reply).is_ok();
                if !delivered {
                    trace!("Reply dropped, sender stopped waiting");
                }
                delivered
            }
            None => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_reply_round() {
        let (envelope, reply_rx) = Envelope::request("ping", MessageSender::extension());
        assert!(envelope.expects_reply());

        let (message, _, responder) = envelope.into_parts();
        assert_eq!(message, "ping");
        assert!(responder.send(Reply::ok()));

        let reply = reply_rx.await.expect("reply");
        assert!(reply.success);
    }

    #[test]
    fn test_posted_envelope_has_no_reply() {
        let envelope = Envelope::post("ping", MessageSender::extension());
        assert!(!envelope.expects_reply());
        let (_, _, responder) = envelope.into_parts();
        assert!(!responder.send(Reply::ok()));
    }

    #[tokio::test]
    async fn test_dropped_responder_closes_channel() {
        let (envelope, reply_rx) = Envelope::request((), MessageSender::extension());
        drop(envelope);
        assert!(reply_rx.await.is_err());
    }
}
