use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::PROVIDER;
use super::config::PartitionedPublisherConfig;
use super::transport::{PartitionedClient, PartitionedConnector, ProducerRecord};
use crate::marshal::Marshaler;
use crate::message::Message;
use crate::pubsub::Publisher;
use crate::utils::error::{Error, Result};

pub struct PartitionedPublisher {
    client: Arc<dyn PartitionedClient>,
    marshaler: Arc<dyn Marshaler<ProducerRecord>>,
}

impl PartitionedPublisher {
    pub async fn connect(
        connector: &dyn PartitionedConnector,
        config: PartitionedPublisherConfig,
    ) -> Result<Self> {
        config.validate()?;
        let Some(marshaler) = config.marshaler.clone() else {
            return Err(Error::Configuration(
                "PartitionedPublisherConfig.marshaler is missing".to_string(),
            ));
        };

        let client = connector
            .connect(&config.brokers, &config.client_id)
            .await
            .map_err(|source| Error::Connection {
                backend: PROVIDER,
                source,
            })?;

        Ok(Self { client, marshaler })
    }
}

#[async_trait]
impl Publisher for PartitionedPublisher {
    /// Produce `messages` in order, each confirmed before the next is sent.
    async fn publish(&self, topic: &str, messages: &[Message]) -> Result<()> {
        for msg in messages {
            let record = self.marshaler.marshal(topic, msg)?;

            let position = self
                .client
                .produce(topic, record)
                .await
                .map_err(|e| Error::delivery(format!("producing message {} failed", msg.uuid), e))?;

            trace!(
                message_uuid = %msg.uuid,
                topic_name = topic,
                partition = position.partition,
                offset = position.offset,
                "Message sent"
            );
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| Error::delivery("closing producer failed", e))?;
        debug!(provider = PROVIDER, "Partitioned publisher closed");
        Ok(())
    }
}
