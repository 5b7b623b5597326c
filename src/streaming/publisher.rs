use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use super::PROVIDER;
use super::config::StreamingPublisherConfig;
use super::transport::{StreamingConnection, StreamingConnector};
use crate::marshal::Marshaler;
use crate::message::Message;
use crate::pubsub::Publisher;
use crate::utils::error::{Error, Result, TransportError};

pub struct StreamingPublisher {
    conn: Arc<dyn StreamingConnection>,
    marshaler: Arc<dyn Marshaler<Bytes>>,
    config: StreamingPublisherConfig,
}

impl StreamingPublisher {
    /// Validate `config` and connect. Fails fast when the server is
    /// unreachable within `connect_options.connect_timeout`.
    pub async fn connect(
        connector: &dyn StreamingConnector,
        config: StreamingPublisherConfig,
    ) -> Result<Self> {
        config.validate()?;
        let Some(marshaler) = config.marshaler.clone() else {
            return Err(Error::Configuration(
                "StreamingPublisherConfig.marshaler is missing".to_string(),
            ));
        };

        let conn = connect(connector, &config).await?;
        Ok(Self {
            conn,
            marshaler,
            config,
        })
    }
}

async fn connect(
    connector: &dyn StreamingConnector,
    config: &StreamingPublisherConfig,
) -> Result<Arc<dyn StreamingConnection>> {
    let timeout = config.connect_options.connect_timeout;
    tokio::time::timeout(
        timeout,
        connector.connect(&config.cluster_id, &config.client_id, &config.connect_options),
    )
    .await
    .unwrap_or(Err(TransportError::Timeout(timeout)))
    .map_err(|source| Error::Connection {
        backend: PROVIDER,
        source,
    })
}

#[async_trait]
impl Publisher for StreamingPublisher {
    /// Publish `messages` in order.
    ///
    /// Does not return until the server confirmed every message. The first
    /// failure stops the batch; messages before it stay published.
    async fn publish(&self, topic: &str, messages: &[Message]) -> Result<()> {
        let ack_wait = self.config.connect_options.publish_ack_wait;

        for msg in messages {
            trace!(message_uuid = %msg.uuid, topic_name = topic, "Publishing message");

            let data = self.marshaler.marshal(topic, msg)?;

            tokio::time::timeout(ack_wait, self.conn.publish(topic, data))
                .await
                .unwrap_or(Err(TransportError::Timeout(ack_wait)))
                .map_err(|e| Error::delivery(format!("sending message {} failed", msg.uuid), e))?;
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        trace!("Closing publisher");
        self.conn
            .close()
            .await
            .map_err(|e| Error::delivery("closing streaming connection failed", e))?;
        trace!("StreamingPublisher closed");
        Ok(())
    }
}
