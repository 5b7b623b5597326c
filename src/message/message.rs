//! Message definition and acknowledgment state machine.
//!
//! A `Message` is created either by application code before publishing or by
//! a subscriber adapter when it unmarshals a native broker message. The
//! consumer of a delivered message must eventually call [`Message::ack`] or
//! [`Message::nack`]; the adapter observes the outcome through
//! [`Message::acked`] / [`Message::nacked`] and relays it to the broker.
//!
//! Notes on fields:
//! - `uuid`: correlation id for logs, never used for ordering or dedup
//! - `payload`: opaque bytes
//! - `metadata`: string key/value pairs, order irrelevant
//!
//! Clones share the acknowledgment state, so acking any clone acks them all.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use uuid::Uuid;

pub type Metadata = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Pending,
    Acked,
    Nacked,
}

/// Generate a random message id.
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Clone)]
pub struct Message {
    pub uuid: String,
    pub payload: Bytes,
    pub metadata: Metadata,
    state: Arc<watch::Sender<AckState>>,
}

impl Message {
    pub fn new(uuid: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            uuid: uuid.into(),
            payload: payload.into(),
            metadata: Metadata::new(),
            state: Arc::new(watch::Sender::new(AckState::Pending)),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn state(&self) -> AckState {
        *self.state.borrow()
    }

    /// Acknowledge the message.
    ///
    /// Returns `true` if the message is acked once this call returns, `false`
    /// if it had already been nacked. Repeated calls do not re-fire
    /// [`Message::acked`].
    pub fn ack(&self) -> bool {
        self.transition(AckState::Acked)
    }

    /// Negatively acknowledge the message so the broker can redeliver it.
    ///
    /// Mirror image of [`Message::ack`].
    pub fn nack(&self) -> bool {
        self.transition(AckState::Nacked)
    }

    /// Resolves once the message is acked. Never resolves if it is nacked.
    pub async fn acked(&self) {
        self.wait_for(AckState::Acked).await
    }

    /// Resolves once the message is nacked. Never resolves if it is acked.
    pub async fn nacked(&self) {
        self.wait_for(AckState::Nacked).await
    }

    fn transition(&self, target: AckState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == AckState::Pending {
                *state = target;
                true
            } else {
                false
            }
        });
        self.state() == target
    }

    async fn wait_for(&self, target: AckState) {
        let mut rx = self.state.subscribe();
        if rx.wait_for(|state| *state == target).await.is_err() {
            // the sender lives as long as `self`; this branch is unreachable in practice
            std::future::pending::<()>().await;
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("uuid", &self.uuid)
            .field("payload_len", &self.payload.len())
            .field("metadata", &self.metadata)
            .field("state", &self.state())
            .finish()
    }
}
