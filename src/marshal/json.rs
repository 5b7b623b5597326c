//! JSON envelope codec.
//!
//! Used where the native representation is a plain byte frame (the
//! streaming bus). The whole message (uuid, metadata, payload) is encoded
//! into one JSON document.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{Marshaler, Unmarshaler};
use crate::message::{Message, Metadata};
use crate::utils::error::CodecError;

#[derive(Serialize, Deserialize)]
struct Envelope {
    uuid: String,
    #[serde(default)]
    metadata: Metadata,
    payload: Bytes,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMarshaler;

impl Marshaler<Bytes> for JsonMarshaler {
    fn marshal(&self, _topic: &str, msg: &Message) -> Result<Bytes, CodecError> {
        let envelope = Envelope {
            uuid: msg.uuid.clone(),
            metadata: msg.metadata.clone(),
            payload: msg.payload.clone(),
        };
        serde_json::to_vec(&envelope)
            .map(Bytes::from)
            .map_err(|source| CodecError::Encode {
                uuid: msg.uuid.clone(),
                source,
            })
    }
}

impl Unmarshaler<Bytes> for JsonMarshaler {
    fn unmarshal(&self, native: &Bytes) -> Result<Message, CodecError> {
        let envelope: Envelope = serde_json::from_slice(native).map_err(CodecError::Decode)?;
        let mut msg = Message::new(envelope.uuid, envelope.payload);
        msg.metadata = envelope.metadata;
        Ok(msg)
    }
}
