use std::sync::Arc;
use std::time::Duration;

use super::marshal::DefaultMarshaler;
use super::transport::{ConsumerRecord, InitialOffset, ProducerRecord};
use crate::config::PartitionedSettings;
use crate::marshal::{Marshaler, Unmarshaler};
use crate::utils::error::{Error, Result};

#[derive(Clone)]
pub struct PartitionedPublisherConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    /// Required; see [`DefaultMarshaler`] and
    /// [`PartitioningMarshaler`](super::PartitioningMarshaler).
    pub marshaler: Option<Arc<dyn Marshaler<ProducerRecord>>>,
}

impl PartitionedPublisherConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            client_id: "popsub_bridge".to_string(),
            marshaler: None,
        }
    }

    pub fn from_settings(settings: &PartitionedSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            ..Self::new(settings.brokers.clone())
        }
    }

    pub fn with_marshaler(mut self, marshaler: impl Marshaler<ProducerRecord> + 'static) -> Self {
        self.marshaler = Some(Arc::new(marshaler));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.marshaler.is_none() {
            return Err(Error::Configuration(
                "PartitionedPublisherConfig.marshaler is missing".to_string(),
            ));
        }
        validate_brokers(&self.brokers)
    }
}

#[derive(Clone)]
pub struct PartitionedSubscriberConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    /// Offsets are committed per group; required.
    pub consumer_group: String,
    pub initial_offset: InitialOffset,
    /// Pause after a nack before fetching again, so a record the consumer
    /// keeps rejecting does not spin the loop.
    pub nack_resend_sleep: Duration,
    /// Defaults to [`DefaultMarshaler`].
    pub unmarshaler: Option<Arc<dyn Unmarshaler<ConsumerRecord>>>,
}

impl PartitionedSubscriberConfig {
    pub fn new(brokers: Vec<String>, consumer_group: impl Into<String>) -> Self {
        Self {
            brokers,
            client_id: "popsub_bridge".to_string(),
            consumer_group: consumer_group.into(),
            initial_offset: InitialOffset::Earliest,
            nack_resend_sleep: Duration::from_millis(100),
            unmarshaler: None,
        }
    }

    pub fn from_settings(settings: &PartitionedSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            ..Self::new(settings.brokers.clone(), settings.consumer_group.clone())
        }
    }

    pub fn with_unmarshaler(
        mut self,
        unmarshaler: impl Unmarshaler<ConsumerRecord> + 'static,
    ) -> Self {
        self.unmarshaler = Some(Arc::new(unmarshaler));
        self
    }

    pub(crate) fn set_defaults(&mut self) {
        if self.unmarshaler.is_none() {
            self.unmarshaler = Some(Arc::new(DefaultMarshaler));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.consumer_group.is_empty() {
            return Err(Error::Configuration(
                "PartitionedSubscriberConfig.consumer_group is empty".to_string(),
            ));
        }
        validate_brokers(&self.brokers)
    }
}

fn validate_brokers(brokers: &[String]) -> Result<()> {
    if brokers.is_empty() {
        return Err(Error::Configuration("no brokers configured".to_string()));
    }
    Ok(())
}
