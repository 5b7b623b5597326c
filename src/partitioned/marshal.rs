//! Default log codec: payload as record value, metadata as headers, plus a
//! header carrying the uuid. Records carry no key unless a
//! [`PartitioningMarshaler`] supplies one.

use std::sync::Arc;

use bytes::Bytes;

use super::transport::{ConsumerRecord, ProducerRecord};
use crate::marshal::{Marshaler, UUID_KEY, Unmarshaler, check_reserved};
use crate::message::{Message, Metadata};
use crate::utils::error::CodecError;

/// Picks the record key for a message; records with the same key land on the
/// same partition and keep their relative order.
pub type PartitionKeyFn = Arc<dyn Fn(&str, &Message) -> Option<String> + Send + Sync>;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMarshaler;

impl Marshaler<ProducerRecord> for DefaultMarshaler {
    fn marshal(&self, _topic: &str, msg: &Message) -> Result<ProducerRecord, CodecError> {
        check_reserved(msg)?;

        let mut headers = Vec::with_capacity(msg.metadata.len() + 1);
        headers.push((UUID_KEY.to_string(), Bytes::from(msg.uuid.clone())));
        for (key, value) in &msg.metadata {
            headers.push((key.clone(), Bytes::from(value.clone())));
        }

        Ok(ProducerRecord {
            key: None,
            value: msg.payload.clone(),
            headers,
        })
    }
}

impl Unmarshaler<ConsumerRecord> for DefaultMarshaler {
    fn unmarshal(&self, native: &ConsumerRecord) -> Result<Message, CodecError> {
        let mut uuid = None;
        let mut metadata = Metadata::new();

        for (key, value) in &native.headers {
            let value = std::str::from_utf8(value)
                .map_err(|_| CodecError::Invalid(format!("header '{key}' is not valid UTF-8")))?;
            if key == UUID_KEY {
                uuid = Some(value.to_string());
            } else {
                metadata.insert(key.clone(), value.to_string());
            }
        }

        let uuid = uuid.unwrap_or_else(|| {
            format!("{}-{}-{}", native.topic, native.partition, native.offset)
        });
        let mut msg = Message::new(uuid, native.value.clone());
        msg.metadata = metadata;
        Ok(msg)
    }
}

/// [`DefaultMarshaler`] that also sets the record key.
#[derive(Clone)]
pub struct PartitioningMarshaler {
    key: PartitionKeyFn,
}

impl PartitioningMarshaler {
    pub fn new(key: impl Fn(&str, &Message) -> Option<String> + Send + Sync + 'static) -> Self {
        Self { key: Arc::new(key) }
    }
}

impl Marshaler<ProducerRecord> for PartitioningMarshaler {
    fn marshal(&self, topic: &str, msg: &Message) -> Result<ProducerRecord, CodecError> {
        let mut record = DefaultMarshaler.marshal(topic, msg)?;
        record.key = (self.key)(topic, msg).map(Bytes::from);
        Ok(record)
    }
}

impl Unmarshaler<ConsumerRecord> for PartitioningMarshaler {
    fn unmarshal(&self, native: &ConsumerRecord) -> Result<Message, CodecError> {
        DefaultMarshaler.unmarshal(native)
    }
}
