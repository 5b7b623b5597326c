//! # popsub_bridge
//!
//! Broker-agnostic publish/subscribe adapters. Application code talks to the
//! [`Publisher`](pubsub::Publisher) and [`Subscriber`](pubsub::Subscriber)
//! traits and exchanges [`Message`](message::Message)s; each backend adapter
//! translates that contract onto a native broker client.
//!
//! ## Core Modules
//!
//! - `message`: The message type and its one-shot ack/nack state.
//! - `marshal`: Codec traits between messages and native broker forms.
//! - `pubsub`: The publisher/subscriber traits, the subscription registry, the
//!   delivery hand-off and the shutdown coordinator shared by all backends.
//! - `streaming`: Streaming bus with synchronous publish confirmation.
//! - `cloud`: Cloud pub/sub with explicit topics and subscriptions.
//! - `partitioned`: Partitioned log with consumer-group offsets.
//! - `memory`: An in-process broker implementing every backend's client
//!   traits.
//! - `config`: Loads backend and logging settings.
//! - `utils`: Error types and logging setup.

pub mod cloud;
pub mod config;
pub mod marshal;
pub mod memory;
pub mod message;
pub mod partitioned;
pub mod pubsub;
pub mod streaming;
pub mod utils;

pub use message::Message;
pub use pubsub::{Output, Publisher, Subscriber};
pub use utils::error::{Error, Result};
