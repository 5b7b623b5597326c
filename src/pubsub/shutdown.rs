//! Per-subscriber shutdown bookkeeping.
//!
//! `closing` is broadcast to every receive loop; each loop runs under a
//! child token so the native receive call is cancelled together with it.
//! The tracker plays the wait group: `close` returns only after every loop
//! it spawned has returned (and dropped its output sender).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Default)]
pub struct Shutdown {
    closed: AtomicBool,
    closing: CancellationToken,
    tracker: TaskTracker,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Signal observed by every receive loop and delivery in progress.
    pub fn closing(&self) -> &CancellationToken {
        &self.closing
    }

    /// Cancellation scope for one subscription. Cancelled on close.
    pub fn scope(&self) -> CancellationToken {
        self.closing.child_token()
    }

    /// Run a receive loop tracked by this coordinator.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Broadcast closing and wait for every tracked loop to drain.
    ///
    /// Returns `false` when the coordinator was already closed, in which case
    /// nothing is awaited.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closing.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        true
    }
}
