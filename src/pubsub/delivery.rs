//! Hand-off of one unmarshaled message to the consumer and relay of the
//! consumer's decision to the native broker.
//!
//! Every backend's receive loop funnels through [`deliver`]; the backend only
//! supplies an [`Acknowledger`] wrapping its native confirmation primitive.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::Message;
use crate::utils::error::TransportError;

/// Native confirmation primitive for one received message.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), TransportError>;
    async fn nack(&self) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    Nacked,
    /// Subscriber closed before the consumer decided; the broker got a nack.
    Closing,
    /// The consumer dropped the output channel; the broker got a nack.
    Disconnected,
}

impl Outcome {
    /// Whether the receive loop should keep pulling messages.
    pub fn keep_receiving(self) -> bool {
        matches!(self, Outcome::Acked | Outcome::Nacked)
    }
}

/// Deliver `msg` on `output`, then wait for the consumer's ack or nack and
/// forward it through `acker`.
///
/// When `closing` fires first, at either step, the message is nacked so the
/// broker can hand it to someone else. Closing wins ties against a racing ack.
pub async fn deliver(
    msg: Message,
    output: &flume::Sender<Message>,
    closing: &CancellationToken,
    acker: &dyn Acknowledger,
) -> Outcome {
    tokio::select! {
        biased;
        _ = closing.cancelled() => {
            info!(message_uuid = %msg.uuid, "Message not consumed, subscriber is closing");
            relay_nack(acker, &msg.uuid).await;
            return Outcome::Closing;
        }
        sent = output.send_async(msg.clone()) => {
            if sent.is_err() {
                debug!(message_uuid = %msg.uuid, "Output channel dropped by consumer");
                relay_nack(acker, &msg.uuid).await;
                return Outcome::Disconnected;
            }
        }
    }

    tokio::select! {
        biased;
        _ = closing.cancelled() => {
            debug!(message_uuid = %msg.uuid, "Subscriber closing before ack, nacking");
            relay_nack(acker, &msg.uuid).await;
            Outcome::Closing
        }
        _ = msg.acked() => {
            relay_ack(acker, &msg.uuid).await;
            Outcome::Acked
        }
        _ = msg.nacked() => {
            relay_nack(acker, &msg.uuid).await;
            Outcome::Nacked
        }
    }
}

async fn relay_ack(acker: &dyn Acknowledger, uuid: &str) {
    if let Err(e) = acker.ack().await {
        warn!(message_uuid = %uuid, error = %e, "Could not ack message on broker");
    }
}

pub(crate) async fn relay_nack(acker: &dyn Acknowledger, uuid: &str) {
    if let Err(e) = acker.nack().await {
        warn!(message_uuid = %uuid, error = %e, "Could not nack message on broker");
    }
}
