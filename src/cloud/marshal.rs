//! Default cloud codec: the payload becomes the message data and metadata
//! become attributes, plus one attribute carrying the uuid.

use super::transport::{OutgoingMessage, ReceivedMessage};
use crate::marshal::{Marshaler, UUID_KEY, Unmarshaler, check_reserved};
use crate::message::Message;
use crate::utils::error::CodecError;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMarshaler;

impl Marshaler<OutgoingMessage> for DefaultMarshaler {
    fn marshal(&self, _topic: &str, msg: &Message) -> Result<OutgoingMessage, CodecError> {
        check_reserved(msg)?;

        let mut attributes = msg.metadata.clone();
        attributes.insert(UUID_KEY.to_string(), msg.uuid.clone());

        Ok(OutgoingMessage {
            data: msg.payload.clone(),
            attributes,
        })
    }
}

impl Unmarshaler<ReceivedMessage> for DefaultMarshaler {
    /// Messages published without the uuid attribute fall back to the
    /// server-assigned id.
    fn unmarshal(&self, native: &ReceivedMessage) -> Result<Message, CodecError> {
        let mut metadata = native.attributes.clone();
        let uuid = metadata
            .remove(UUID_KEY)
            .unwrap_or_else(|| native.id.clone());

        let mut msg = Message::new(uuid, native.data.clone());
        msg.metadata = metadata;
        Ok(msg)
    }
}
