//! Error types shared by every backend adapter.
//!
//! Three layers are kept apart:
//! - [`TransportError`]: what a native broker client reports.
//! - [`CodecError`]: marshal/unmarshal failures between a [`Message`] and
//!   the native representation.
//! - [`Error`]: what the `Publisher`/`Subscriber` surface returns, carrying
//!   the subscription/topic context needed to act on a failure.
//!
//! [`Message`]: crate::message::Message

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure reported by a native broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection is closed")]
    Disconnected,

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("broker error: {0}")]
    Broker(String),
}

/// Failure translating between a message and its native form.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("could not encode message {uuid}")]
    Encode {
        uuid: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not decode message")]
    Decode(#[source] serde_json::Error),

    #[error("metadata key '{0}' is reserved")]
    ReservedMetadata(String),

    #[error("invalid message: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("cannot connect to {backend}")]
    Connection {
        backend: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("subscription does not exist: {0}")]
    SubscriptionNotFound(String),

    #[error("topic does not exist: {0}")]
    TopicNotFound(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("subscriber is closed")]
    SubscriberClosed,

    #[error("{context}")]
    Delivery {
        context: String,
        #[source]
        source: TransportError,
    },

    #[error("{context}")]
    Registry {
        context: String,
        #[source]
        source: TransportError,
    },
}

impl Error {
    pub(crate) fn delivery(context: impl Into<String>, source: TransportError) -> Self {
        Error::Delivery {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn registry(context: impl Into<String>, source: TransportError) -> Self {
        Error::Registry {
            context: context.into(),
            source,
        }
    }

    /// True for the two not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::SubscriptionNotFound(_) | Error::TopicNotFound(_)
        )
    }
}
