//! Subscription registry
//!
//! Caches broker-side handles by name. Lookups take the read lock only, so
//! any number of callers can hit the cache concurrently. A miss takes the
//! write lock, checks again and runs the creation routine while still holding
//! it, so two first-time callers for the same name never both create.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;

use crate::utils::error::Result;

#[derive(Debug)]
pub struct SubscriptionRegistry<H> {
    entries: RwLock<HashMap<String, H>>,
}

impl<H: Clone> SubscriptionRegistry<H> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `name`, or run `create` and cache its
    /// result. A failed `create` caches nothing.
    pub async fn resolve<F, Fut>(&self, name: &str, create: F) -> Result<H>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H>>,
    {
        if let Some(handle) = self.entries.read().await.get(name) {
            return Ok(handle.clone());
        }

        let mut entries = self.entries.write().await;
        if let Some(handle) = entries.get(name) {
            return Ok(handle.clone());
        }

        let handle = create().await?;
        entries.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    pub async fn get(&self, name: &str) -> Option<H> {
        self.entries.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<H: Clone> Default for SubscriptionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
