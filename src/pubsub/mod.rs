//! The uniform publisher/subscriber contract and the machinery every
//! backend adapter shares:
//!
//! - [`Publisher`] / [`Subscriber`]: the capability traits application code
//!   is written against.
//! - [`registry`]: create-if-missing cache of broker-side subscriptions.
//! - [`shutdown`]: closing signal, per-subscription scopes and drain tracking.
//! - [`delivery`]: hands a message to the consumer and relays its
//!   acknowledgment to the native broker.

use async_trait::async_trait;

use crate::message::Message;
use crate::utils::error::Result;

pub mod delivery;
pub mod registry;
pub mod shutdown;

pub use delivery::Acknowledger;
pub use registry::SubscriptionRegistry;

/// Receiving side of a subscription. Closed once the receive loop behind it
/// has finished.
pub type Output = flume::Receiver<Message>;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `messages` to `topic` in order, stopping at the first failure.
    async fn publish(&self, topic: &str, messages: &[Message]) -> Result<()>;

    /// Release the broker connection. Must not race in-flight `publish` calls.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Start consuming `topic`. Every delivered message must be acked or
    /// nacked by the consumer.
    async fn subscribe(&self, topic: &str) -> Result<Output>;

    /// Stop every receive loop, nack whatever is still in flight and close
    /// the broker connection. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests;
