//! Pluggable codecs between [`Message`] and a backend's native form.
//!
//! Each backend names its own native type (`Bytes` for the streaming bus,
//! `OutgoingMessage`/`ReceivedMessage` for cloud pub/sub, producer/consumer
//! records for the partitioned log) and ships a default codec for it.

use crate::message::Message;
use crate::utils::error::CodecError;

pub mod json;

pub use json::JsonMarshaler;

/// Metadata/attribute/header key carrying the message uuid on backends that
/// have no native slot for it.
pub const UUID_KEY: &str = "_message_uuid";

pub trait Marshaler<N>: Send + Sync {
    fn marshal(&self, topic: &str, msg: &Message) -> Result<N, CodecError>;
}

pub trait Unmarshaler<N>: Send + Sync {
    fn unmarshal(&self, native: &N) -> Result<Message, CodecError>;
}

/// Reject metadata that would collide with the uuid key.
pub(crate) fn check_reserved(msg: &Message) -> Result<(), CodecError> {
    if msg.metadata.contains_key(UUID_KEY) {
        return Err(CodecError::ReservedMetadata(UUID_KEY.to_string()));
    }
    Ok(())
}
