use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::PROVIDER;
use super::config::PartitionedSubscriberConfig;
use super::transport::{ConsumerRecord, InitialOffset, PartitionedClient, PartitionedConnector};
use crate::marshal::Unmarshaler;
use crate::message::Message;
use crate::pubsub::delivery::{Acknowledger, Outcome, deliver};
use crate::pubsub::shutdown::Shutdown;
use crate::pubsub::{Output, Subscriber};
use crate::utils::error::{Error, Result, TransportError};

pub struct PartitionedSubscriber {
    client: Arc<dyn PartitionedClient>,
    config: PartitionedSubscriberConfig,
    unmarshaler: Arc<dyn Unmarshaler<ConsumerRecord>>,
    shutdown: Shutdown,
}

impl PartitionedSubscriber {
    pub async fn connect(
        connector: &dyn PartitionedConnector,
        mut config: PartitionedSubscriberConfig,
    ) -> Result<Self> {
        config.set_defaults();
        config.validate()?;
        let Some(unmarshaler) = config.unmarshaler.clone() else {
            return Err(Error::Configuration(
                "PartitionedSubscriberConfig.unmarshaler is missing".to_string(),
            ));
        };

        let client = connector
            .connect(&config.brokers, &config.client_id)
            .await
            .map_err(|source| Error::Connection {
                backend: PROVIDER,
                source,
            })?;

        Ok(Self {
            client,
            config,
            unmarshaler,
            shutdown: Shutdown::new(),
        })
    }
}

#[async_trait]
impl Subscriber for PartitionedSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<Output> {
        if self.shutdown.is_closed() {
            return Err(Error::SubscriberClosed);
        }
        info!(
            provider = PROVIDER,
            topic,
            consumer_group = %self.config.consumer_group,
            "Subscribing to partitioned topic"
        );

        let (output, receiver) = flume::bounded(0);
        let consumer = Consumer {
            client: self.client.clone(),
            group: self.config.consumer_group.clone(),
            topic: topic.to_string(),
            initial_offset: self.config.initial_offset,
            nack_resend_sleep: self.config.nack_resend_sleep,
            unmarshaler: self.unmarshaler.clone(),
        };
        let span = info_span!(
            "receive",
            provider = PROVIDER,
            topic,
            consumer_group = %self.config.consumer_group
        );
        if self.shutdown.is_closed() {
            return Err(Error::SubscriberClosed);
        }
        let scope = self.shutdown.scope();
        let closing = self.shutdown.closing().clone();

        self.shutdown.spawn(
            async move {
                if let Err(e) = consumer.receive(output, scope, closing).await {
                    error!(error = %e, "Receiving messages failed");
                }
                debug!("Message consumer finished");
            }
            .instrument(span),
        );

        Ok(receiver)
    }

    async fn close(&self) -> Result<()> {
        if !self.shutdown.close().await {
            return Ok(());
        }
        self.client
            .close()
            .await
            .map_err(|e| Error::delivery("closing consumer failed", e))?;
        debug!(provider = PROVIDER, "Partitioned subscriber closed");
        Ok(())
    }
}

struct Consumer {
    client: Arc<dyn PartitionedClient>,
    group: String,
    topic: String,
    initial_offset: InitialOffset,
    nack_resend_sleep: Duration,
    unmarshaler: Arc<dyn Unmarshaler<ConsumerRecord>>,
}

impl Consumer {
    async fn receive(
        self,
        output: flume::Sender<Message>,
        scope: CancellationToken,
        closing: CancellationToken,
    ) -> Result<()> {
        loop {
            let fetched = tokio::select! {
                biased;
                _ = scope.cancelled() => return Ok(()),
                fetched = self.client.fetch(&self.group, &self.topic, self.initial_offset) => fetched,
            };
            let record = match fetched {
                Ok(record) => record,
                Err(e) if closing.is_cancelled() => {
                    debug!(error = %e, "Fetch failed while closing");
                    return Ok(());
                }
                Err(e) => {
                    return Err(Error::delivery(
                        format!("fetching from {} failed", self.topic),
                        e,
                    ));
                }
            };

            let acker = OffsetAcker {
                client: self.client.clone(),
                group: self.group.clone(),
                topic: self.topic.clone(),
                partition: record.partition,
                offset: record.offset,
            };

            let msg = match self.unmarshaler.unmarshal(&record) {
                Ok(msg) => msg,
                Err(e) => {
                    // seeking back would fetch the same record forever
                    error!(
                        error = %e,
                        partition = record.partition,
                        offset = record.offset,
                        "Could not unmarshal record, skipping it"
                    );
                    if let Err(e) = acker.ack().await {
                        warn!(error = %e, offset = record.offset, "Could not commit past record");
                    }
                    continue;
                }
            };

            let outcome = deliver(msg, &output, &closing, &acker).await;
            match outcome {
                Outcome::Acked => {}
                Outcome::Nacked => {
                    tokio::select! {
                        biased;
                        _ = scope.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.nack_resend_sleep) => {}
                    }
                }
                Outcome::Closing | Outcome::Disconnected => return Ok(()),
            }
        }
    }
}

/// Ack commits the offset after the record; nack rewinds the group onto it.
struct OffsetAcker {
    client: Arc<dyn PartitionedClient>,
    group: String,
    topic: String,
    partition: u32,
    offset: u64,
}

#[async_trait]
impl Acknowledger for OffsetAcker {
    async fn ack(&self) -> Result<(), TransportError> {
        self.client
            .commit(&self.group, &self.topic, self.partition, self.offset + 1)
            .await
    }

    async fn nack(&self) -> Result<(), TransportError> {
        self.client
            .seek(&self.group, &self.topic, self.partition, self.offset)
            .await
    }
}
