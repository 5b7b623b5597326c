//! Capability surface of a partitioned-log client.
//!
//! Producing is synchronous: `produce` resolves to the record's position.
//! Consuming is pull-based per consumer group; progress is recorded by
//! committing offsets, and `seek` moves the group's fetch position so a
//! record can be fetched again.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::utils::error::TransportError;

pub type Headers = Vec<(String, Bytes)>;

#[derive(Debug, Clone, Default)]
pub struct ProducerRecord {
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: Headers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPosition {
    pub partition: u32,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: Headers,
}

/// Where a consumer group without a committed offset starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialOffset {
    #[default]
    Earliest,
    Latest,
}

#[async_trait]
pub trait PartitionedConnector: Send + Sync {
    async fn connect(
        &self,
        brokers: &[String],
        client_id: &str,
    ) -> Result<Arc<dyn PartitionedClient>, TransportError>;
}

#[async_trait]
pub trait PartitionedClient: Send + Sync {
    async fn produce(
        &self,
        topic: &str,
        record: ProducerRecord,
    ) -> Result<RecordPosition, TransportError>;

    /// Wait for the next record of `topic` for `group`. Cancel-safe: a record
    /// is only consumed from the group position when it is returned.
    async fn fetch(
        &self,
        group: &str,
        topic: &str,
        initial: InitialOffset,
    ) -> Result<ConsumerRecord, TransportError>;

    /// Record `offset` as the next offset `group` should read.
    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: u64,
    ) -> Result<(), TransportError>;

    /// Move the fetch position of `group` back (or forward) to `offset`.
    async fn seek(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: u64,
    ) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
