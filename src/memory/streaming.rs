use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{ConnectionState, MemoryBroker};
use crate::streaming::transport::{
    ConnectOptions, MessageStream, StreamingConnection, StreamingConnector, StreamingMessage,
    SubscriptionOptions,
};
use crate::utils::error::TransportError;

struct MemoryStreamingConnection {
    broker: MemoryBroker,
    client_id: String,
    state: ConnectionState,
}

/// Removes a non-durable subscription once its stream is gone.
struct EphemeralGuard {
    broker: MemoryBroker,
    subscription: String,
    ephemeral: bool,
}

impl Drop for EphemeralGuard {
    fn drop(&mut self) {
        if self.ephemeral {
            self.broker
                .engine
                .lock()
                .delete_subscription(&self.subscription);
        }
    }
}

struct StreamState {
    guard: EphemeralGuard,
    subject: String,
    cancel: CancellationToken,
}

#[async_trait]
impl StreamingConnector for MemoryBroker {
    async fn connect(
        &self,
        _cluster_id: &str,
        client_id: &str,
        _options: &ConnectOptions,
    ) -> Result<Arc<dyn StreamingConnection>, TransportError> {
        self.check_available()?;
        Ok(Arc::new(MemoryStreamingConnection {
            broker: self.clone(),
            client_id: client_id.to_string(),
            state: ConnectionState::default(),
        }))
    }
}

impl MemoryStreamingConnection {
    fn subscription_name(&self, subject: &str, options: &SubscriptionOptions) -> (String, bool) {
        match (&options.queue_group, &options.durable_name) {
            (Some(queue), Some(durable)) => (format!("{subject}.{queue}.{durable}"), false),
            (Some(queue), None) => (format!("{subject}.{queue}"), false),
            (None, Some(durable)) => (format!("{}.{subject}.{durable}", self.client_id), false),
            (None, None) => (
                format!("{}.{subject}.{}", self.client_id, crate::message::new_uuid()),
                true,
            ),
        }
    }
}

#[async_trait]
impl StreamingConnection for MemoryStreamingConnection {
    async fn publish(&self, subject: &str, data: Bytes) -> Result<(), TransportError> {
        self.state.check_open()?;
        let mut engine = self.broker.engine.lock();
        engine.ensure_topic(subject);
        engine.publish(subject, data, Default::default())?;
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        options: &SubscriptionOptions,
        cancel: CancellationToken,
    ) -> Result<MessageStream, TransportError> {
        self.state.check_open()?;
        let (subscription, ephemeral) = self.subscription_name(subject, options);

        {
            let mut engine = self.broker.engine.lock();
            engine.ensure_topic(subject);
            if !engine.subscriptions.contains_key(&subscription) {
                engine.create_subscription(
                    &subscription,
                    subject,
                    options.ack_wait.as_millis() as i64,
                )?;
            }
        }

        let state = StreamState {
            guard: EphemeralGuard {
                broker: self.broker.clone(),
                subscription,
                ephemeral,
            },
            subject: subject.to_string(),
            cancel,
        };

        let stream = futures::stream::unfold(Some(state), |state| async move {
            let state = state?;
            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => return None,
                next = state.guard.broker.next_delivery(&state.guard.subscription) => next,
            };
            match next {
                Ok((delivery_id, envelope)) => {
                    let msg = StreamingMessage {
                        subject: state.subject.clone(),
                        sequence: envelope.id.parse().unwrap_or_default(),
                        data: envelope.data,
                        redelivered: envelope.delivery_attempt > 1,
                        acker: state.guard.broker.acker(delivery_id),
                    };
                    Some((Ok(msg), Some(state)))
                }
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.close()
    }
}
