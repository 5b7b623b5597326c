use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use super::PROVIDER;
use super::config::{CloudSubscriberConfig, SubscriptionNameFn};
use super::transport::{
    CloudClient, CloudConnector, MessageHandler, ReceiveSettings, ReceivedMessage,
};
use crate::marshal::Unmarshaler;
use crate::message::Message;
use crate::pubsub::delivery::{Outcome, deliver, relay_nack};
use crate::pubsub::shutdown::Shutdown;
use crate::pubsub::{Output, Subscriber, SubscriptionRegistry};
use crate::utils::error::{Error, Result, TransportError};

/// A broker-side subscription and the topic it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub name: String,
    pub topic: String,
}

pub struct CloudSubscriber {
    client: Arc<dyn CloudClient>,
    config: CloudSubscriberConfig,
    subscription_name: SubscriptionNameFn,
    unmarshaler: Arc<dyn Unmarshaler<ReceivedMessage>>,
    subscriptions: SubscriptionRegistry<SubscriptionHandle>,
    shutdown: Shutdown,
}

impl CloudSubscriber {
    pub async fn connect(
        connector: &dyn CloudConnector,
        mut config: CloudSubscriberConfig,
    ) -> Result<Self> {
        config.set_defaults();
        config.validate()?;
        let (Some(subscription_name), Some(unmarshaler)) =
            (config.subscription_name.clone(), config.unmarshaler.clone())
        else {
            return Err(Error::Configuration(
                "CloudSubscriberConfig defaults were not applied".to_string(),
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
            subscription_name,
            unmarshaler,
            subscriptions: SubscriptionRegistry::new(),
            shutdown: Shutdown::new(),
        })
    }

    /// Cached subscription for `name`, created on first use unless the
    /// config forbids it.
    async fn subscription(&self, name: &str, topic: &str) -> Result<SubscriptionHandle> {
        self.subscriptions
            .resolve(name, || {
                create_subscription(self.client.as_ref(), &self.config, name, topic)
            })
            .await
    }
}

async fn create_subscription(
    client: &dyn CloudClient,
    config: &CloudSubscriberConfig,
    name: &str,
    topic: &str,
) -> Result<SubscriptionHandle> {
    let handle = SubscriptionHandle {
        name: name.to_string(),
        topic: topic.to_string(),
    };

    let exists = client.subscription_exists(name).await.map_err(|e| {
        Error::registry(format!("could not check if subscription {name} exists"), e)
    })?;
    if exists {
        return Ok(handle);
    }
    if config.do_not_create_subscription_if_missing {
        return Err(Error::SubscriptionNotFound(name.to_string()));
    }

    let topic_exists = client.topic_exists(topic).await.map_err(|e| {
        Error::registry(format!("could not check if topic {topic} exists"), e)
    })?;
    if !topic_exists {
        if config.do_not_create_topic_if_missing {
            return Err(Error::TopicNotFound(topic.to_string()));
        }
        match client.create_topic(topic).await {
            Ok(()) | Err(TransportError::AlreadyExists { .. }) => {}
            Err(e) => {
                return Err(Error::registry(
                    format!("could not create topic {topic} for subscription {name}"),
                    e,
                ));
            }
        }
    }

    let mut sub_config = config.subscription_config.clone();
    sub_config.topic = topic.to_string();
    client
        .create_subscription(name, &sub_config)
        .await
        .map_err(|e| {
            Error::registry(
                format!("could not create subscription {name} for topic {topic}"),
                e,
            )
        })?;

    debug!(provider = PROVIDER, subscription_name = name, topic, "Created subscription");
    Ok(handle)
}

#[async_trait]
impl Subscriber for CloudSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<Output> {
        if self.shutdown.is_closed() {
            return Err(Error::SubscriberClosed);
        }

        let name = (self.subscription_name)(topic);
        info!(
            provider = PROVIDER,
            topic,
            subscription_name = %name,
            "Subscribing to cloud pub/sub topic"
        );

        let handle = self.subscription(&name, topic).await.inspect_err(|e| {
            error!(error = %e, subscription_name = %name, "Could not obtain subscription");
        })?;
        if self.shutdown.is_closed() {
            return Err(Error::SubscriberClosed);
        }

        let (output, receiver) = flume::bounded(0);
        let span = info_span!(
            "receive",
            provider = PROVIDER,
            topic,
            subscription_name = %handle.name
        );
        let client = self.client.clone();
        let settings = self.config.receive_settings.clone();
        let unmarshaler = self.unmarshaler.clone();
        let scope = self.shutdown.scope();
        let closing = self.shutdown.closing().clone();

        self.shutdown.spawn(
            async move {
                let result = receive(
                    client.as_ref(),
                    &handle,
                    &settings,
                    scope,
                    output,
                    unmarshaler,
                    closing,
                )
                .await;
                if let Err(e) = result {
                    error!(error = %e, "Receiving messages failed");
                }
                debug!("Closing message consumer");
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
            .map_err(|e| Error::delivery("closing cloud client failed", e))?;
        debug!(provider = PROVIDER, "Cloud subscriber closed");
        Ok(())
    }
}

async fn receive(
    client: &dyn CloudClient,
    handle: &SubscriptionHandle,
    settings: &ReceiveSettings,
    scope: CancellationToken,
    output: flume::Sender<Message>,
    unmarshaler: Arc<dyn Unmarshaler<ReceivedMessage>>,
    closing: CancellationToken,
) -> Result<()> {
    let handler_closing = closing.clone();
    let handler_scope = scope.clone();
    let handler: MessageHandler = Arc::new(move |native: ReceivedMessage| {
        let output = output.clone();
        let unmarshaler = unmarshaler.clone();
        let closing = handler_closing.clone();
        let scope = handler_scope.clone();

        async move {
            let msg = match unmarshaler.unmarshal(&native) {
                Ok(msg) => msg,
                Err(e) => {
                    error!(error = %e, message_id = %native.id, "Could not unmarshal message");
                    relay_nack(native.acker.as_ref(), &native.id).await;
                    return;
                }
            };

            if deliver(msg, &output, &closing, native.acker.as_ref()).await
                == Outcome::Disconnected
            {
                // nobody is reading anymore; stop pulling
                scope.cancel();
            }
        }
        .boxed()
    });

    let result = client.receive(&handle.name, settings, scope, handler).await;
    match result {
        Err(e) if !closing.is_cancelled() => Err(Error::delivery(
            format!("receive on subscription {} failed", handle.name),
            e,
        )),
        _ => Ok(()),
    }
}
