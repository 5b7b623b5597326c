use std::time::Duration;

use serde::Deserialize;

use crate::streaming::transport::ConnectOptions;

/// Top-level configuration for the adapters and the demo binary.
///
/// One section per backend, plus logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub streaming: StreamingSettings,
    pub cloud: CloudSettings,
    pub partitioned: PartitionedSettings,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Connection and subscription settings for the streaming bus.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StreamingSettings {
    pub cluster_id: String,
    pub client_id: String,
    pub url: String,
    pub connect_timeout_ms: u64,
    pub publish_ack_wait_ms: u64,
    pub ack_wait_secs: u64,
    pub queue_group: Option<String>,
    pub durable_name: Option<String>,
    pub subscribers_count: usize,
}

impl StreamingSettings {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            url: self.url.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            publish_ack_wait: Duration::from_millis(self.publish_ack_wait_ms),
        }
    }
}

/// Project and resource policy for cloud pub/sub.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CloudSettings {
    pub project_id: String,
    /// Emulator or alternative service address.
    pub endpoint: Option<String>,
    /// Appended to the topic to name its subscription; empty keeps the
    /// topic name.
    pub subscription_suffix: String,
    pub do_not_create_subscription_if_missing: bool,
    pub do_not_create_topic_if_missing: bool,
    pub max_outstanding_messages: usize,
    pub ack_deadline_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PartitionedSettings {
    pub brokers: Vec<String>,
    pub client_id: String,
    pub consumer_group: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub logging: Option<PartialLoggingSettings>,
    pub streaming: Option<PartialStreamingSettings>,
    pub cloud: Option<PartialCloudSettings>,
    pub partitioned: Option<PartialPartitionedSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStreamingSettings {
    pub cluster_id: Option<String>,
    pub client_id: Option<String>,
    pub url: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub publish_ack_wait_ms: Option<u64>,
    pub ack_wait_secs: Option<u64>,
    pub queue_group: Option<String>,
    pub durable_name: Option<String>,
    pub subscribers_count: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialCloudSettings {
    pub project_id: Option<String>,
    pub endpoint: Option<String>,
    pub subscription_suffix: Option<String>,
    pub do_not_create_subscription_if_missing: Option<bool>,
    pub do_not_create_topic_if_missing: Option<bool>,
    pub max_outstanding_messages: Option<usize>,
    pub ack_deadline_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialPartitionedSettings {
    pub brokers: Option<Vec<String>>,
    pub client_id: Option<String>,
    pub consumer_group: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: "info".to_string(),
            },
            streaming: StreamingSettings {
                cluster_id: "test-cluster".to_string(),
                client_id: "popsub_bridge".to_string(),
                url: "nats://127.0.0.1:4222".to_string(),
                connect_timeout_ms: 2000,
                publish_ack_wait_ms: 30_000,
                ack_wait_secs: 30,
                queue_group: None,
                durable_name: None,
                subscribers_count: 1,
            },
            cloud: CloudSettings {
                project_id: "local-project".to_string(),
                endpoint: None,
                subscription_suffix: String::new(),
                do_not_create_subscription_if_missing: false,
                do_not_create_topic_if_missing: false,
                max_outstanding_messages: 1000,
                ack_deadline_secs: 10,
            },
            partitioned: PartitionedSettings {
                brokers: vec!["127.0.0.1:9092".to_string()],
                client_id: "popsub_bridge".to_string(),
                consumer_group: "popsub_bridge".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let logging = self.logging.unwrap_or_default();
        let streaming = self.streaming.unwrap_or_default();
        let cloud = self.cloud.unwrap_or_default();
        let partitioned = self.partitioned.unwrap_or_default();

        Settings {
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
            streaming: StreamingSettings {
                cluster_id: streaming
                    .cluster_id
                    .unwrap_or(default.streaming.cluster_id),
                client_id: streaming.client_id.unwrap_or(default.streaming.client_id),
                url: streaming.url.unwrap_or(default.streaming.url),
                connect_timeout_ms: streaming
                    .connect_timeout_ms
                    .unwrap_or(default.streaming.connect_timeout_ms),
                publish_ack_wait_ms: streaming
                    .publish_ack_wait_ms
                    .unwrap_or(default.streaming.publish_ack_wait_ms),
                ack_wait_secs: streaming
                    .ack_wait_secs
                    .unwrap_or(default.streaming.ack_wait_secs),
                queue_group: streaming.queue_group.or(default.streaming.queue_group),
                durable_name: streaming.durable_name.or(default.streaming.durable_name),
                subscribers_count: streaming
                    .subscribers_count
                    .unwrap_or(default.streaming.subscribers_count),
            },
            cloud: CloudSettings {
                project_id: cloud.project_id.unwrap_or(default.cloud.project_id),
                endpoint: cloud.endpoint.or(default.cloud.endpoint),
                subscription_suffix: cloud
                    .subscription_suffix
                    .unwrap_or(default.cloud.subscription_suffix),
                do_not_create_subscription_if_missing: cloud
                    .do_not_create_subscription_if_missing
                    .unwrap_or(default.cloud.do_not_create_subscription_if_missing),
                do_not_create_topic_if_missing: cloud
                    .do_not_create_topic_if_missing
                    .unwrap_or(default.cloud.do_not_create_topic_if_missing),
                max_outstanding_messages: cloud
                    .max_outstanding_messages
                    .unwrap_or(default.cloud.max_outstanding_messages),
                ack_deadline_secs: cloud
                    .ack_deadline_secs
                    .unwrap_or(default.cloud.ack_deadline_secs),
            },
            partitioned: PartitionedSettings {
                brokers: partitioned.brokers.unwrap_or(default.partitioned.brokers),
                client_id: partitioned
                    .client_id
                    .unwrap_or(default.partitioned.client_id),
                consumer_group: partitioned
                    .consumer_group
                    .unwrap_or(default.partitioned.consumer_group),
            },
        }
    }
}
