//! Topic management
//!
//! A `Topic` holds the names of the subscriptions bound to it. Every message
//! published to the topic is copied into each of them. Binding the same
//! subscription twice is a no-op.
//!
//! Callers synchronize access through the engine lock.

use std::collections::HashSet;

pub type SubscriptionName = String;

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscriptions: HashSet<SubscriptionName>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscriptions: HashSet::new(),
        }
    }

    pub fn bind(&mut self, subscription: SubscriptionName) {
        self.subscriptions.insert(subscription);
    }

    pub fn unbind(&mut self, subscription: &str) {
        self.subscriptions.remove(subscription);
    }
}
