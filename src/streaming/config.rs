use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::transport::{ConnectOptions, SubscriptionOptions};
use super::valid_client_id;
use crate::config::StreamingSettings;
use crate::marshal::{JsonMarshaler, Marshaler, Unmarshaler};
use crate::utils::error::{Error, Result};

#[derive(Clone)]
pub struct StreamingPublisherConfig {
    pub cluster_id: String,
    /// Alphanumerics, `-` and `_` only.
    pub client_id: String,
    pub connect_options: ConnectOptions,
    /// Required; there is no default codec for publishing.
    pub marshaler: Option<Arc<dyn Marshaler<Bytes>>>,
}

impl StreamingPublisherConfig {
    pub fn new(cluster_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            client_id: client_id.into(),
            connect_options: ConnectOptions::default(),
            marshaler: None,
        }
    }

    pub fn from_settings(settings: &StreamingSettings) -> Self {
        Self {
            cluster_id: settings.cluster_id.clone(),
            client_id: settings.client_id.clone(),
            connect_options: settings.connect_options(),
            marshaler: None,
        }
    }

    pub fn with_marshaler(mut self, marshaler: impl Marshaler<Bytes> + 'static) -> Self {
        self.marshaler = Some(Arc::new(marshaler));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.marshaler.is_none() {
            return Err(Error::Configuration(
                "StreamingPublisherConfig.marshaler is missing".to_string(),
            ));
        }
        validate_identity(&self.cluster_id, &self.client_id)
    }
}

#[derive(Clone)]
pub struct StreamingSubscriberConfig {
    pub cluster_id: String,
    pub client_id: String,
    /// Subscribers sharing a queue group split the messages between them.
    pub queue_group: Option<String>,
    pub durable_name: Option<String>,
    /// Receive loops started per `subscribe`. More than one needs a queue
    /// group, otherwise every loop would get its own copy of each message.
    pub subscribers_count: usize,
    pub ack_wait: Duration,
    pub connect_options: ConnectOptions,
    /// Defaults to [`JsonMarshaler`].
    pub unmarshaler: Option<Arc<dyn Unmarshaler<Bytes>>>,
}

impl StreamingSubscriberConfig {
    pub fn new(cluster_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            client_id: client_id.into(),
            queue_group: None,
            durable_name: None,
            subscribers_count: 1,
            ack_wait: Duration::from_secs(30),
            connect_options: ConnectOptions::default(),
            unmarshaler: None,
        }
    }

    pub fn from_settings(settings: &StreamingSettings) -> Self {
        Self {
            queue_group: settings.queue_group.clone(),
            durable_name: settings.durable_name.clone(),
            subscribers_count: settings.subscribers_count,
            ack_wait: Duration::from_secs(settings.ack_wait_secs),
            connect_options: settings.connect_options(),
            ..Self::new(settings.cluster_id.clone(), settings.client_id.clone())
        }
    }

    pub fn with_unmarshaler(mut self, unmarshaler: impl Unmarshaler<Bytes> + 'static) -> Self {
        self.unmarshaler = Some(Arc::new(unmarshaler));
        self
    }

    pub(crate) fn set_defaults(&mut self) {
        if self.unmarshaler.is_none() {
            self.unmarshaler = Some(Arc::new(JsonMarshaler));
        }
        if self.subscribers_count == 0 {
            self.subscribers_count = 1;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.subscribers_count > 1 && self.queue_group.is_none() {
            return Err(Error::Configuration(
                "StreamingSubscriberConfig.queue_group is required when subscribers_count > 1"
                    .to_string(),
            ));
        }
        validate_identity(&self.cluster_id, &self.client_id)
    }

    pub(crate) fn subscription_options(&self) -> SubscriptionOptions {
        SubscriptionOptions {
            durable_name: self.durable_name.clone(),
            queue_group: self.queue_group.clone(),
            ack_wait: self.ack_wait,
        }
    }
}

fn validate_identity(cluster_id: &str, client_id: &str) -> Result<()> {
    if cluster_id.is_empty() {
        return Err(Error::Configuration("cluster_id is empty".to_string()));
    }
    if !valid_client_id(client_id) {
        return Err(Error::Configuration(format!(
            "client_id '{client_id}' may contain only alphanumeric, '-' or '_' characters"
        )));
    }
    Ok(())
}
