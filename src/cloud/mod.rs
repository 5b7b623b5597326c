//! Cloud pub/sub backend.
//!
//! Topics and subscriptions are explicit broker resources. The subscriber
//! looks subscriptions up through a [`SubscriptionRegistry`] and, unless told
//! otherwise, creates the missing topic and subscription on first use.
//! Delivery is push-based: the client calls back per message and the
//! adapter answers with the consumer's ack or nack.
//!
//! [`SubscriptionRegistry`]: crate::pubsub::SubscriptionRegistry

pub mod config;
pub mod marshal;
pub mod publisher;
pub mod subscriber;
pub mod transport;

pub use config::{
    CloudPublisherConfig, CloudSubscriberConfig, SubscriptionNameFn, default_subscription_name,
    subscription_name_with_suffix,
};
pub use marshal::DefaultMarshaler;
pub use publisher::CloudPublisher;
pub use subscriber::{CloudSubscriber, SubscriptionHandle};

pub const PROVIDER: &str = "cloud";
