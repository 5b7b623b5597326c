//! Streaming-bus backend.
//!
//! Publishing waits for the server confirmation of every message before the
//! next one is sent, so a successful `publish` means the whole batch is
//! stored. Subscriptions use manual acks: an unacked message is redelivered
//! after `ack_wait`, a nacked one right away.
//!
//! Messages travel as one JSON envelope per frame ([`JsonMarshaler`]) unless
//! another codec is configured.
//!
//! [`JsonMarshaler`]: crate::marshal::JsonMarshaler

pub mod config;
pub mod publisher;
pub mod subscriber;
pub mod transport;

pub use config::{StreamingPublisherConfig, StreamingSubscriberConfig};
pub use publisher::StreamingPublisher;
pub use subscriber::StreamingSubscriber;

pub const PROVIDER: &str = "streaming";

/// Client ids may only contain ASCII alphanumerics, `-` and `_`.
pub(crate) fn valid_client_id(client_id: &str) -> bool {
    !client_id.is_empty()
        && client_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests;
