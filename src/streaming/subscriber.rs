use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use super::PROVIDER;
use super::config::StreamingSubscriberConfig;
use super::transport::{MessageStream, StreamingConnection, StreamingConnector};
use crate::marshal::Unmarshaler;
use crate::message::Message;
use crate::pubsub::delivery::{deliver, relay_nack};
use crate::pubsub::shutdown::Shutdown;
use crate::pubsub::{Output, Subscriber};
use crate::utils::error::{Error, Result, TransportError};

pub struct StreamingSubscriber {
    conn: Arc<dyn StreamingConnection>,
    config: StreamingSubscriberConfig,
    unmarshaler: Arc<dyn Unmarshaler<Bytes>>,
    shutdown: Shutdown,
}

impl StreamingSubscriber {
    pub async fn connect(
        connector: &dyn StreamingConnector,
        mut config: StreamingSubscriberConfig,
    ) -> Result<Self> {
        config.set_defaults();
        config.validate()?;
        let Some(unmarshaler) = config.unmarshaler.clone() else {
            return Err(Error::Configuration(
                "StreamingSubscriberConfig.unmarshaler is missing".to_string(),
            ));
        };

        let timeout = config.connect_options.connect_timeout;
        let conn = tokio::time::timeout(
            timeout,
            connector.connect(&config.cluster_id, &config.client_id, &config.connect_options),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout(timeout)))
        .map_err(|source| Error::Connection {
            backend: PROVIDER,
            source,
        })?;

        Ok(Self {
            conn,
            config,
            unmarshaler,
            shutdown: Shutdown::new(),
        })
    }
}

#[async_trait]
impl Subscriber for StreamingSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<Output> {
        if self.shutdown.is_closed() {
            return Err(Error::SubscriberClosed);
        }
        info!(
            provider = PROVIDER,
            topic,
            queue_group = ?self.config.queue_group,
            durable_name = ?self.config.durable_name,
            "Subscribing to streaming subject"
        );

        let options = self.config.subscription_options();
        let mut streams = Vec::with_capacity(self.config.subscribers_count);
        for _ in 0..self.config.subscribers_count {
            let scope = self.shutdown.scope();
            let stream = self
                .conn
                .subscribe(topic, &options, scope)
                .await
                .map_err(|e| Error::delivery(format!("cannot subscribe to subject {topic}"), e))?;
            streams.push(stream);
        }
        if self.shutdown.is_closed() {
            // closed while subscribing; dropping the streams releases them
            return Err(Error::SubscriberClosed);
        }

        let (output, receiver) = flume::bounded(0);
        for (consumer, stream) in streams.into_iter().enumerate() {
            let span = info_span!("receive", provider = PROVIDER, topic, consumer);
            let output = output.clone();
            let unmarshaler = self.unmarshaler.clone();
            let closing = self.shutdown.closing().clone();

            self.shutdown.spawn(
                async move {
                    if let Err(e) = receive(stream, output, unmarshaler, closing).await {
                        error!(error = %e, "Receiving messages failed");
                    }
                    debug!("Message consumer finished");
                }
                .instrument(span),
            );
        }

        Ok(receiver)
    }

    async fn close(&self) -> Result<()> {
        if !self.shutdown.close().await {
            return Ok(());
        }
        self.conn
            .close()
            .await
            .map_err(|e| Error::delivery("closing streaming connection failed", e))?;
        debug!(provider = PROVIDER, "Streaming subscriber closed");
        Ok(())
    }
}

async fn receive(
    mut stream: MessageStream,
    output: flume::Sender<Message>,
    unmarshaler: Arc<dyn Unmarshaler<Bytes>>,
    closing: CancellationToken,
) -> Result<()> {
    while let Some(next) = stream.next().await {
        let native = match next {
            Ok(native) => native,
            Err(e) if closing.is_cancelled() => {
                debug!(error = %e, "Stream failed while closing");
                return Ok(());
            }
            Err(e) => return Err(Error::delivery("receive failed", e)),
        };

        let msg = match unmarshaler.unmarshal(&native.data) {
            Ok(msg) => msg,
            Err(e) => {
                error!(error = %e, sequence = native.sequence, "Could not unmarshal message");
                relay_nack(native.acker.as_ref(), &native.sequence.to_string()).await;
                continue;
            }
        };

        if !deliver(msg, &output, &closing, native.acker.as_ref())
            .await
            .keep_receiving()
        {
            return Ok(());
        }
    }

    if closing.is_cancelled() {
        Ok(())
    } else {
        Err(Error::delivery(
            "message stream ended unexpectedly",
            TransportError::Disconnected,
        ))
    }
}
