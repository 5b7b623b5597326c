//! Capability surface of a cloud pub/sub client.
//!
//! Topics and subscriptions are explicit resources that may or may not
//! exist. Publishing is asynchronous: the client hands back a ticket that
//! resolves to the server-assigned id once the message is stored. Receiving
//! is push-based: the client invokes a handler per message, possibly
//! concurrently, until cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::pubsub::Acknowledger;
use crate::utils::error::TransportError;

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Overrides the service endpoint, e.g. an emulator address.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Topic the subscription is bound to. Filled in by the subscriber.
    pub topic: String,
    pub ack_deadline: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            topic: String::new(),
            ack_deadline: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReceiveSettings {
    /// Upper bound on handler invocations awaiting ack at the same time.
    pub max_outstanding_messages: usize,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            max_outstanding_messages: 1000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub data: Bytes,
    pub attributes: HashMap<String, String>,
}

pub struct ReceivedMessage {
    pub id: String,
    pub data: Bytes,
    pub attributes: HashMap<String, String>,
    pub delivery_attempt: u32,
    pub acker: Arc<dyn Acknowledger>,
}

/// Resolves to the server-assigned message id.
pub type PublishTicket = BoxFuture<'static, Result<String, TransportError>>;

pub type MessageHandler = Arc<dyn Fn(ReceivedMessage) -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait CloudConnector: Send + Sync {
    async fn connect(
        &self,
        project_id: &str,
        options: &ClientOptions,
    ) -> Result<Arc<dyn CloudClient>, TransportError>;
}

#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn topic_exists(&self, topic: &str) -> Result<bool, TransportError>;

    async fn create_topic(&self, topic: &str) -> Result<(), TransportError>;

    async fn subscription_exists(&self, subscription: &str) -> Result<bool, TransportError>;

    async fn create_subscription(
        &self,
        subscription: &str,
        config: &SubscriptionConfig,
    ) -> Result<(), TransportError>;

    /// Enqueue `msg` locally; the returned ticket tracks the server side.
    async fn publish(
        &self,
        topic: &str,
        msg: OutgoingMessage,
    ) -> Result<PublishTicket, TransportError>;

    /// Push messages of `subscription` into `handler` until `cancel` fires.
    ///
    /// Returns only after every handler invocation has returned.
    async fn receive(
        &self,
        subscription: &str,
        settings: &ReceiveSettings,
        cancel: CancellationToken,
        handler: MessageHandler,
    ) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
