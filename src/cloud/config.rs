use std::sync::Arc;
use std::time::Duration;

use super::marshal::DefaultMarshaler;
use super::transport::{
    ClientOptions, OutgoingMessage, ReceiveSettings, ReceivedMessage, SubscriptionConfig,
};
use crate::config::CloudSettings;
use crate::marshal::{Marshaler, Unmarshaler};
use crate::utils::error::{Error, Result};

/// Maps a topic to the name of the subscription consuming it.
pub type SubscriptionNameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Subscription named exactly like its topic.
pub fn default_subscription_name() -> SubscriptionNameFn {
    Arc::new(|topic| topic.to_string())
}

/// Subscription named `<topic><suffix>`, so several services can each hold
/// their own subscription to one topic.
pub fn subscription_name_with_suffix(suffix: impl Into<String>) -> SubscriptionNameFn {
    let suffix = suffix.into();
    Arc::new(move |topic| format!("{topic}{suffix}"))
}

#[derive(Clone)]
pub struct CloudSubscriberConfig {
    pub project_id: String,
    /// Defaults to [`default_subscription_name`].
    pub subscription_name: Option<SubscriptionNameFn>,
    pub do_not_create_subscription_if_missing: bool,
    pub do_not_create_topic_if_missing: bool,
    pub receive_settings: ReceiveSettings,
    /// Template for created subscriptions; `topic` is filled in per call.
    pub subscription_config: SubscriptionConfig,
    pub client_options: ClientOptions,
    /// Defaults to [`DefaultMarshaler`].
    pub unmarshaler: Option<Arc<dyn Unmarshaler<ReceivedMessage>>>,
}

impl CloudSubscriberConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            subscription_name: None,
            do_not_create_subscription_if_missing: false,
            do_not_create_topic_if_missing: false,
            receive_settings: ReceiveSettings::default(),
            subscription_config: SubscriptionConfig::default(),
            client_options: ClientOptions::default(),
            unmarshaler: None,
        }
    }

    pub fn from_settings(settings: &CloudSettings) -> Self {
        let mut config = Self::new(settings.project_id.clone());
        if !settings.subscription_suffix.is_empty() {
            config.subscription_name = Some(subscription_name_with_suffix(
                settings.subscription_suffix.clone(),
            ));
        }
        config.do_not_create_subscription_if_missing =
            settings.do_not_create_subscription_if_missing;
        config.do_not_create_topic_if_missing = settings.do_not_create_topic_if_missing;
        config.receive_settings.max_outstanding_messages = settings.max_outstanding_messages;
        config.subscription_config.ack_deadline = Duration::from_secs(settings.ack_deadline_secs);
        config.client_options.endpoint = settings.endpoint.clone();
        config
    }

    pub fn with_unmarshaler(
        mut self,
        unmarshaler: impl Unmarshaler<ReceivedMessage> + 'static,
    ) -> Self {
        self.unmarshaler = Some(Arc::new(unmarshaler));
        self
    }

    pub(crate) fn set_defaults(&mut self) {
        if self.subscription_name.is_none() {
            self.subscription_name = Some(default_subscription_name());
        }
        if self.unmarshaler.is_none() {
            self.unmarshaler = Some(Arc::new(DefaultMarshaler));
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_project(&self.project_id)
    }
}

#[derive(Clone)]
pub struct CloudPublisherConfig {
    pub project_id: String,
    pub do_not_create_topic_if_missing: bool,
    /// Wait for the server to store each message before publishing the next.
    /// When false, `publish` returns once messages are handed to the client.
    pub confirm_delivery: bool,
    pub publish_timeout: Duration,
    pub client_options: ClientOptions,
    /// Defaults to [`DefaultMarshaler`].
    pub marshaler: Option<Arc<dyn Marshaler<OutgoingMessage>>>,
}

impl CloudPublisherConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            do_not_create_topic_if_missing: false,
            confirm_delivery: true,
            publish_timeout: Duration::from_secs(60),
            client_options: ClientOptions::default(),
            marshaler: None,
        }
    }

    pub fn from_settings(settings: &CloudSettings) -> Self {
        let mut config = Self::new(settings.project_id.clone());
        config.do_not_create_topic_if_missing = settings.do_not_create_topic_if_missing;
        config.client_options.endpoint = settings.endpoint.clone();
        config
    }

    pub fn with_marshaler(mut self, marshaler: impl Marshaler<OutgoingMessage> + 'static) -> Self {
        self.marshaler = Some(Arc::new(marshaler));
        self
    }

    pub(crate) fn set_defaults(&mut self) {
        if self.marshaler.is_none() {
            self.marshaler = Some(Arc::new(DefaultMarshaler));
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_project(&self.project_id)
    }
}

fn validate_project(project_id: &str) -> Result<()> {
    if project_id.is_empty() {
        return Err(Error::Configuration("project_id is empty".to_string()));
    }
    Ok(())
}
