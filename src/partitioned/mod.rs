//! Partitioned-log backend.
//!
//! Producing waits for each record's position before sending the next.
//! Consuming pulls records for a consumer group one at a time; an ack
//! commits the offset after the record, a nack seeks the group back to the
//! record so the next fetch returns it again.

pub mod config;
pub mod marshal;
pub mod publisher;
pub mod subscriber;
pub mod transport;

pub use config::{PartitionedPublisherConfig, PartitionedSubscriberConfig};
pub use marshal::{DefaultMarshaler, PartitionKeyFn, PartitioningMarshaler};
pub use publisher::PartitionedPublisher;
pub use subscriber::PartitionedSubscriber;

pub const PROVIDER: &str = "partitioned";
