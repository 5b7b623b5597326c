//! In-memory broker.
//!
//! `MemoryBroker` keeps topics, subscriptions and partitioned logs in process
//! and exposes them through the connector traits of all three backends, so
//! every adapter can run without a network broker. Clones share state.
//!
//! Delivery semantics mirror a real broker closely enough to exercise the
//! adapters: nacked or expired deliveries are redelivered, acks and nacks
//! are counted per subscription, and consumer-group offsets are tracked.

mod cloud;
mod engine;
mod partitioned;
mod streaming;
mod topic;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::pubsub::Acknowledger;
use crate::utils::error::TransportError;
use engine::{Engine, Envelope};

pub use topic::Topic;

/// How often a waiting pull wakes up to reap expired ack deadlines.
const REDELIVERY_CHECK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct MemoryBroker {
    engine: Arc<Mutex<Engine>>,
    available: Arc<AtomicBool>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    /// Broker whose partitioned-log topics get `partitions` partitions each.
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Engine::new(partitions))),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// While unavailable, every connect attempt fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn create_topic(&self, name: &str) -> Result<(), TransportError> {
        self.engine.lock().create_topic(name)
    }

    pub fn has_topic(&self, name: &str) -> bool {
        self.engine.lock().topics.contains_key(name)
    }

    pub fn has_subscription(&self, name: &str) -> bool {
        self.engine.lock().subscriptions.contains_key(name)
    }

    pub fn subscription_count(&self) -> usize {
        self.engine.lock().subscriptions.len()
    }

    /// Acks received for `subscription`.
    pub fn acked_count(&self, subscription: &str) -> u64 {
        self.engine
            .lock()
            .subscriptions
            .get(subscription)
            .map_or(0, |s| s.acked)
    }

    /// Nacks received for `subscription`.
    pub fn nacked_count(&self, subscription: &str) -> u64 {
        self.engine
            .lock()
            .subscriptions
            .get(subscription)
            .map_or(0, |s| s.nacked)
    }

    /// Messages waiting in `subscription`, not counting deliveries in flight.
    pub fn queued_count(&self, subscription: &str) -> usize {
        self.engine
            .lock()
            .subscriptions
            .get(subscription)
            .map_or(0, |s| s.queue.len())
    }

    pub fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        self.engine.lock().committed_offset(group, topic, partition)
    }

    fn check_available(&self) -> Result<(), TransportError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Unavailable("memory broker is down".to_string()))
        }
    }

    /// Wait for the next message of `subscription`. Cancel-safe.
    async fn next_delivery(&self, subscription: &str) -> Result<(u64, Envelope), TransportError> {
        loop {
            let notify = self
                .engine
                .lock()
                .subscriptions
                .get(subscription)
                .map(|s| s.notify.clone())
                .ok_or_else(|| TransportError::NotFound {
                    kind: "subscription",
                    name: subscription.to_string(),
                })?;

            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = chrono::Utc::now().timestamp_millis();
            let pulled = self.engine.lock().pull(subscription, now)?;
            if let Some(delivery) = pulled {
                return Ok(delivery);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(REDELIVERY_CHECK_INTERVAL) => {}
            }
        }
    }

    fn acker(&self, delivery_id: u64) -> Arc<dyn Acknowledger> {
        Arc::new(DeliveryAcker {
            engine: self.engine.clone(),
            delivery_id,
        })
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

struct DeliveryAcker {
    engine: Arc<Mutex<Engine>>,
    delivery_id: u64,
}

#[async_trait]
impl Acknowledger for DeliveryAcker {
    async fn ack(&self) -> Result<(), TransportError> {
        self.engine.lock().handle_ack(self.delivery_id)
    }

    async fn nack(&self) -> Result<(), TransportError> {
        self.engine.lock().handle_nack(self.delivery_id)
    }
}

/// Closed flag shared by the connection facades.
#[derive(Debug, Default)]
struct ConnectionState {
    closed: AtomicBool,
}

impl ConnectionState {
    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
