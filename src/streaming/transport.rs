//! Capability surface of a streaming-bus client.
//!
//! `publish` returns only once the server has confirmed the message; that is
//! what makes the streaming publisher a synchronous-confirm backend.
//! Subscriptions are push streams of manual-ack messages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::pubsub::Acknowledger;
use crate::utils::error::TransportError;

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub url: String,
    pub connect_timeout: Duration,
    /// How long `publish` waits for the server confirmation.
    pub publish_ack_wait: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            connect_timeout: Duration::from_secs(2),
            publish_ack_wait: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    /// Survives reconnects and resumes where the last ack left off.
    pub durable_name: Option<String>,
    /// Members of the same group compete for messages.
    pub queue_group: Option<String>,
    /// Unacked messages are redelivered after this long.
    pub ack_wait: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            durable_name: None,
            queue_group: None,
            ack_wait: Duration::from_secs(30),
        }
    }
}

pub struct StreamingMessage {
    pub subject: String,
    pub sequence: u64,
    pub data: Bytes,
    pub redelivered: bool,
    pub acker: Arc<dyn Acknowledger>,
}

/// Ends when the subscription is cancelled or the connection drops.
pub type MessageStream = BoxStream<'static, Result<StreamingMessage, TransportError>>;

#[async_trait]
pub trait StreamingConnector: Send + Sync {
    async fn connect(
        &self,
        cluster_id: &str,
        client_id: &str,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn StreamingConnection>, TransportError>;
}

#[async_trait]
pub trait StreamingConnection: Send + Sync {
    /// Returns after the server acknowledged receipt of `data`.
    async fn publish(&self, subject: &str, data: Bytes) -> Result<(), TransportError>;

    async fn subscribe(
        &self,
        subject: &str,
        options: &SubscriptionOptions,
        cancel: CancellationToken,
    ) -> Result<MessageStream, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
