//! Broker engine
//!
//! Synchronous state behind [`MemoryBroker`](super::MemoryBroker):
//! - topics with the subscriptions bound to them
//! - one FIFO queue per subscription, fed by topic fan-out
//! - a pending-ack table; unacked deliveries go back to the queue when their
//!   ack deadline expires, and are dropped after `MAX_DELIVERY_ATTEMPTS`
//! - partitioned logs with per-group fetch positions and committed offsets
//!
//! The engine is always held behind a lock; nothing in here awaits.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::topic::Topic;
use crate::partitioned::transport::{
    ConsumerRecord, InitialOffset, ProducerRecord, RecordPosition,
};
use crate::utils::error::TransportError;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: String,
    pub data: Bytes,
    pub attributes: HashMap<String, String>,
    pub delivery_attempt: u32,
}

#[derive(Debug)]
pub struct SubscriptionQueue {
    pub topic: String,
    pub queue: VecDeque<Envelope>,
    pub ack_deadline_ms: i64,
    pub acked: u64,
    pub nacked: u64,
    pub notify: Arc<Notify>,
}

#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub subscription: String,
    pub envelope: Envelope,
    pub sent_at: i64,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    key: Option<Bytes>,
    value: Bytes,
    headers: Vec<(String, Bytes)>,
}

#[derive(Debug)]
pub struct PartitionedLog {
    partitions: Vec<Vec<StoredRecord>>,
    next_partition: usize,
    pub notify: Arc<Notify>,
}

type GroupKey = (String, String, u32);

#[derive(Debug)]
pub struct Engine {
    pub topics: HashMap<String, Topic>,
    pub subscriptions: HashMap<String, SubscriptionQueue>,
    pub pending_acks: HashMap<u64, PendingMessage>,
    pub logs: HashMap<String, PartitionedLog>,
    positions: HashMap<GroupKey, u64>,
    committed: HashMap<GroupKey, u64>,
    /// Partition each (group, topic) starts its next fetch scan from.
    fetch_cursor: HashMap<(String, String), usize>,
    partitions_per_topic: usize,
    next_delivery_id: u64,
    next_message_id: u64,
}

impl Engine {
    /// Deliveries of one message beyond this count are dropped.
    pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

    pub fn new(partitions_per_topic: usize) -> Self {
        Self {
            topics: HashMap::new(),
            subscriptions: HashMap::new(),
            pending_acks: HashMap::new(),
            logs: HashMap::new(),
            positions: HashMap::new(),
            committed: HashMap::new(),
            fetch_cursor: HashMap::new(),
            partitions_per_topic: partitions_per_topic.max(1),
            next_delivery_id: 0,
            next_message_id: 0,
        }
    }

    pub fn create_topic(&mut self, name: &str) -> Result<(), TransportError> {
        if self.topics.contains_key(name) {
            return Err(TransportError::AlreadyExists {
                kind: "topic",
                name: name.to_string(),
            });
        }
        self.topics.insert(name.to_string(), Topic::new(name));
        Ok(())
    }

    pub fn ensure_topic(&mut self, name: &str) {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| Topic::new(name));
    }

    pub fn create_subscription(
        &mut self,
        name: &str,
        topic: &str,
        ack_deadline_ms: i64,
    ) -> Result<(), TransportError> {
        if self.subscriptions.contains_key(name) {
            return Err(TransportError::AlreadyExists {
                kind: "subscription",
                name: name.to_string(),
            });
        }
        let t = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| TransportError::NotFound {
                kind: "topic",
                name: topic.to_string(),
            })?;
        t.bind(name.to_string());

        self.subscriptions.insert(
            name.to_string(),
            SubscriptionQueue {
                topic: topic.to_string(),
                queue: VecDeque::new(),
                ack_deadline_ms,
                acked: 0,
                nacked: 0,
                notify: Arc::new(Notify::new()),
            },
        );
        Ok(())
    }

    pub fn delete_subscription(&mut self, name: &str) {
        if let Some(sub) = self.subscriptions.remove(name) {
            if let Some(topic) = self.topics.get_mut(&sub.topic) {
                topic.unbind(name);
            }
            sub.notify.notify_waiters();
        }
        self.pending_acks.retain(|_, p| p.subscription != name);
    }

    /// Copy a message into every subscription bound to `topic`.
    pub fn publish(
        &mut self,
        topic: &str,
        data: Bytes,
        attributes: HashMap<String, String>,
    ) -> Result<String, TransportError> {
        let t = self.topics.get(topic).ok_or_else(|| TransportError::NotFound {
            kind: "topic",
            name: topic.to_string(),
        })?;

        self.next_message_id += 1;
        let envelope = Envelope {
            id: self.next_message_id.to_string(),
            data,
            attributes,
            delivery_attempt: 0,
        };

        for name in &t.subscriptions {
            if let Some(sub) = self.subscriptions.get_mut(name) {
                sub.queue.push_back(envelope.clone());
                sub.notify.notify_waiters();
            } else {
                warn!(subscription = %name, "Topic references unknown subscription");
            }
        }
        Ok(envelope.id)
    }

    /// Take the next message of `subscription`, recording it as pending.
    pub fn pull(
        &mut self,
        subscription: &str,
        now: i64,
    ) -> Result<Option<(u64, Envelope)>, TransportError> {
        self.redeliver_expired(subscription, now);

        let sub = self
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| TransportError::NotFound {
                kind: "subscription",
                name: subscription.to_string(),
            })?;

        let Some(mut envelope) = sub.queue.pop_front() else {
            return Ok(None);
        };
        envelope.delivery_attempt += 1;

        self.next_delivery_id += 1;
        let delivery_id = self.next_delivery_id;
        self.pending_acks.insert(
            delivery_id,
            PendingMessage {
                subscription: subscription.to_string(),
                envelope: envelope.clone(),
                sent_at: now,
            },
        );
        Ok(Some((delivery_id, envelope)))
    }

    pub fn handle_ack(&mut self, delivery_id: u64) -> Result<(), TransportError> {
        let pending = self.take_pending(delivery_id)?;
        if let Some(sub) = self.subscriptions.get_mut(&pending.subscription) {
            sub.acked += 1;
        }
        Ok(())
    }

    pub fn handle_nack(&mut self, delivery_id: u64) -> Result<(), TransportError> {
        let pending = self.take_pending(delivery_id)?;
        if let Some(sub) = self.subscriptions.get_mut(&pending.subscription) {
            sub.nacked += 1;
        }
        self.requeue(pending);
        Ok(())
    }

    fn take_pending(&mut self, delivery_id: u64) -> Result<PendingMessage, TransportError> {
        self.pending_acks
            .remove(&delivery_id)
            .ok_or_else(|| TransportError::NotFound {
                kind: "delivery",
                name: delivery_id.to_string(),
            })
    }

    fn requeue(&mut self, pending: PendingMessage) {
        let Some(sub) = self.subscriptions.get_mut(&pending.subscription) else {
            return;
        };
        if pending.envelope.delivery_attempt >= Self::MAX_DELIVERY_ATTEMPTS {
            warn!(
                subscription = %pending.subscription,
                message_id = %pending.envelope.id,
                attempts = pending.envelope.delivery_attempt,
                "Message dropped after reaching max delivery attempts"
            );
            return;
        }
        sub.queue.push_front(pending.envelope);
        sub.notify.notify_waiters();
    }

    fn redeliver_expired(&mut self, subscription: &str, now: i64) {
        let Some(deadline) = self
            .subscriptions
            .get(subscription)
            .map(|s| s.ack_deadline_ms)
        else {
            return;
        };

        let expired: Vec<u64> = self
            .pending_acks
            .iter()
            .filter(|(_, p)| p.subscription == subscription && now - p.sent_at > deadline)
            .map(|(id, _)| *id)
            .collect();

        for delivery_id in expired {
            if let Some(pending) = self.pending_acks.remove(&delivery_id) {
                debug!(
                    subscription,
                    message_id = %pending.envelope.id,
                    "Ack deadline expired, redelivering"
                );
                self.requeue(pending);
            }
        }
    }

    pub fn produce(&mut self, topic: &str, record: ProducerRecord) -> RecordPosition {
        let partitions_per_topic = self.partitions_per_topic;
        let log = self
            .logs
            .entry(topic.to_string())
            .or_insert_with(|| PartitionedLog {
                partitions: vec![Vec::new(); partitions_per_topic],
                next_partition: 0,
                notify: Arc::new(Notify::new()),
            });

        let partition = match &record.key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % log.partitions.len() as u64) as usize
            }
            None => {
                let p = log.next_partition;
                log.next_partition = (p + 1) % log.partitions.len();
                p
            }
        };

        let records = &mut log.partitions[partition];
        records.push(StoredRecord {
            key: record.key,
            value: record.value,
            headers: record.headers,
        });
        log.notify.notify_waiters();

        RecordPosition {
            partition: partition as u32,
            offset: (records.len() - 1) as u64,
        }
    }

    pub fn log_notify(&mut self, topic: &str) -> Arc<Notify> {
        let partitions_per_topic = self.partitions_per_topic;
        self.logs
            .entry(topic.to_string())
            .or_insert_with(|| PartitionedLog {
                partitions: vec![Vec::new(); partitions_per_topic],
                next_partition: 0,
                notify: Arc::new(Notify::new()),
            })
            .notify
            .clone()
    }

    /// Next record for `group` across the partitions of `topic`.
    ///
    /// The scan starts one partition after the last one served, so a busy
    /// partition cannot starve the others.
    pub fn fetch(
        &mut self,
        group: &str,
        topic: &str,
        initial: InitialOffset,
    ) -> Option<ConsumerRecord> {
        let log = self.logs.get(topic)?;
        let count = log.partitions.len();
        let cursor_key = (group.to_string(), topic.to_string());
        let start = self.fetch_cursor.get(&cursor_key).copied().unwrap_or(0) % count;

        for step in 0..count {
            let partition = (start + step) % count;
            let records = &log.partitions[partition];
            let key = (group.to_string(), topic.to_string(), partition as u32);
            let committed = self.committed.get(&key).copied();
            let position = self.positions.entry(key).or_insert_with(|| {
                committed.unwrap_or(match initial {
                    InitialOffset::Earliest => 0,
                    InitialOffset::Latest => records.len() as u64,
                })
            });

            if let Some(stored) = records.get(*position as usize) {
                let record = ConsumerRecord {
                    topic: topic.to_string(),
                    partition: partition as u32,
                    offset: *position,
                    key: stored.key.clone(),
                    value: stored.value.clone(),
                    headers: stored.headers.clone(),
                };
                *position += 1;
                self.fetch_cursor.insert(cursor_key, partition + 1);
                return Some(record);
            }
        }
        None
    }

    pub fn commit(&mut self, group: &str, topic: &str, partition: u32, offset: u64) {
        self.committed
            .insert((group.to_string(), topic.to_string(), partition), offset);
    }

    pub fn seek(&mut self, group: &str, topic: &str, partition: u32, offset: u64) {
        self.positions
            .insert((group.to_string(), topic.to_string(), partition), offset);
    }

    pub fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        self.committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }
}
