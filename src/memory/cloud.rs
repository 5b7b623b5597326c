use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{ConnectionState, MemoryBroker};
use crate::cloud::transport::{
    ClientOptions, CloudClient, CloudConnector, MessageHandler, OutgoingMessage, PublishTicket,
    ReceiveSettings, ReceivedMessage, SubscriptionConfig,
};
use crate::utils::error::TransportError;

struct MemoryCloudClient {
    broker: MemoryBroker,
    state: ConnectionState,
}

#[async_trait]
impl CloudConnector for MemoryBroker {
    async fn connect(
        &self,
        _project_id: &str,
        _options: &ClientOptions,
    ) -> Result<Arc<dyn CloudClient>, TransportError> {
        self.check_available()?;
        Ok(Arc::new(MemoryCloudClient {
            broker: self.clone(),
            state: ConnectionState::default(),
        }))
    }
}

#[async_trait]
impl CloudClient for MemoryCloudClient {
    async fn topic_exists(&self, topic: &str) -> Result<bool, TransportError> {
        self.state.check_open()?;
        Ok(self.broker.has_topic(topic))
    }

    async fn create_topic(&self, topic: &str) -> Result<(), TransportError> {
        self.state.check_open()?;
        self.broker.create_topic(topic)
    }

    async fn subscription_exists(&self, subscription: &str) -> Result<bool, TransportError> {
        self.state.check_open()?;
        Ok(self.broker.has_subscription(subscription))
    }

    async fn create_subscription(
        &self,
        subscription: &str,
        config: &SubscriptionConfig,
    ) -> Result<(), TransportError> {
        self.state.check_open()?;
        self.broker.engine.lock().create_subscription(
            subscription,
            &config.topic,
            config.ack_deadline.as_millis() as i64,
        )
    }

    async fn publish(
        &self,
        topic: &str,
        msg: OutgoingMessage,
    ) -> Result<PublishTicket, TransportError> {
        self.state.check_open()?;
        let stored = self
            .broker
            .engine
            .lock()
            .publish(topic, msg.data, msg.attributes);
        Ok(futures::future::ready(stored).boxed())
    }

    async fn receive(
        &self,
        subscription: &str,
        settings: &ReceiveSettings,
        cancel: CancellationToken,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        self.state.check_open()?;

        let permits = Arc::new(Semaphore::new(settings.max_outstanding_messages.max(1)));
        let mut in_flight = JoinSet::new();
        let mut result = Ok(());

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = permits.clone().acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                result = Err(TransportError::Cancelled);
                break;
            };

            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                delivery = self.broker.next_delivery(subscription) => delivery,
            };
            let (delivery_id, envelope) = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            if let Err(e) = self.state.check_open() {
                // hand the message back before giving up
                let requeued = self.broker.engine.lock().handle_nack(delivery_id);
                if let Err(nack_err) = requeued {
                    warn!(error = %nack_err, delivery_id, "Could not requeue message");
                }
                result = Err(e);
                break;
            }

            let msg = ReceivedMessage {
                id: envelope.id,
                data: envelope.data,
                attributes: envelope.attributes,
                delivery_attempt: envelope.delivery_attempt,
                acker: self.broker.acker(delivery_id),
            };
            let callback = handler(msg);
            in_flight.spawn(async move {
                callback.await;
                drop(permit);
            });

            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        result
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.close()
    }
}
