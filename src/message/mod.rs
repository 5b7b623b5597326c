//! The `message` module defines the envelope handed between publishers,
//! brokers and consumers, and the per-message acknowledgment handshake.

#[allow(clippy::module_inception)]
pub mod message;

pub use message::{AckState, Message, Metadata, new_uuid};

#[cfg(test)]
mod tests;
