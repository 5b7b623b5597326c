use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::PROVIDER;
use super::config::CloudPublisherConfig;
use super::transport::{CloudClient, CloudConnector, OutgoingMessage};
use crate::marshal::Marshaler;
use crate::message::Message;
use crate::pubsub::{Publisher, SubscriptionRegistry};
use crate::utils::error::{Error, Result, TransportError};

pub struct CloudPublisher {
    client: Arc<dyn CloudClient>,
    config: CloudPublisherConfig,
    marshaler: Arc<dyn Marshaler<OutgoingMessage>>,
    /// Topics known to exist, keyed by name.
    topics: SubscriptionRegistry<String>,
}

impl CloudPublisher {
    pub async fn connect(
        connector: &dyn CloudConnector,
        mut config: CloudPublisherConfig,
    ) -> Result<Self> {
        config.set_defaults();
        config.validate()?;
        let Some(marshaler) = config.marshaler.clone() else {
            return Err(Error::Configuration(
                "CloudPublisherConfig.marshaler is missing".to_string(),
            ));
        };

        let client = connector
            .connect(&config.project_id, &config.client_options)
            .await
            .map_err(|source| Error::Connection {
                backend: PROVIDER,
                source,
            })?;

        Ok(Self {
            client,
            config,
            marshaler,
            topics: SubscriptionRegistry::new(),
        })
    }

    async fn topic(&self, topic: &str) -> Result<String> {
        self.topics
            .resolve(topic, || async {
                let exists = self.client.topic_exists(topic).await.map_err(|e| {
                    Error::registry(format!("could not check if topic {topic} exists"), e)
                })?;
                if exists {
                    return Ok(topic.to_string());
                }
                if self.config.do_not_create_topic_if_missing {
                    return Err(Error::TopicNotFound(topic.to_string()));
                }

                debug!(provider = PROVIDER, topic, "Creating topic");
                match self.client.create_topic(topic).await {
                    Ok(()) | Err(TransportError::AlreadyExists { .. }) => Ok(topic.to_string()),
                    Err(e) => Err(Error::registry(format!("could not create topic {topic}"), e)),
                }
            })
            .await
    }
}

#[async_trait]
impl Publisher for CloudPublisher {
    /// Publish `messages` in order.
    ///
    /// With `confirm_delivery` each message is stored by the server before
    /// the next is sent; otherwise the call returns after local enqueue.
    async fn publish(&self, topic: &str, messages: &[Message]) -> Result<()> {
        let topic = self.topic(topic).await?;
        let timeout = self.config.publish_timeout;

        for msg in messages {
            trace!(message_uuid = %msg.uuid, topic_name = %topic, "Publishing message");

            let native = self.marshaler.marshal(&topic, msg)?;

            let ticket = self.client.publish(&topic, native).await.map_err(|e| {
                Error::delivery(format!("publishing message {} failed", msg.uuid), e)
            })?;

            if self.config.confirm_delivery {
                let server_id = tokio::time::timeout(timeout, ticket)
                    .await
                    .unwrap_or(Err(TransportError::Timeout(timeout)))
                    .map_err(|e| {
                        Error::delivery(format!("message {} was not stored", msg.uuid), e)
                    })?;
                trace!(message_uuid = %msg.uuid, server_id = %server_id, "Message stored");
            }
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| Error::delivery("closing cloud client failed", e))?;
        debug!(provider = PROVIDER, "Cloud publisher closed");
        Ok(())
    }
}
