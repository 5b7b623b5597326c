use super::delivery::{Acknowledger, Outcome, deliver};
use super::registry::SubscriptionRegistry;
use super::shutdown::Shutdown;
use crate::message::Message;
use crate::utils::error::{Error, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CountingAcker {
    acks: AtomicUsize,
    nacks: AtomicUsize,
}

#[async_trait]
impl Acknowledger for CountingAcker {
    async fn ack(&self) -> Result<(), TransportError> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self) -> Result<(), TransportError> {
        self.nacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_registry_creates_once_under_concurrency() {
    let registry = Arc::new(SubscriptionRegistry::<String>::new());
    let creations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        let creations = creations.clone();
        handles.push(tokio::spawn(async move {
            registry
                .resolve("orders", || async {
                    creations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok("orders-handle".to_string())
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "orders-handle");
    }
    assert_eq!(creations.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_registry_does_not_cache_failures() {
    let registry = SubscriptionRegistry::<String>::new();

    let err = registry
        .resolve("orders", || async {
            Err(Error::SubscriptionNotFound("orders".into()))
        })
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(registry.is_empty().await);

    let handle = registry
        .resolve("orders", || async { Ok("created".to_string()) })
        .await
        .unwrap();
    assert_eq!(handle, "created");
    assert_eq!(registry.get("orders").await.as_deref(), Some("created"));
}

#[tokio::test]
async fn test_shutdown_close_is_idempotent_and_waits() {
    let shutdown = Shutdown::new();
    let scope = shutdown.scope();
    let finished = Arc::new(AtomicUsize::new(0));

    let done = finished.clone();
    shutdown.spawn(async move {
        scope.cancelled().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        done.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!shutdown.is_closed());
    assert!(shutdown.close().await);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(shutdown.is_closed());
    assert!(!shutdown.close().await);
}

#[tokio::test]
async fn test_deliver_relays_ack() {
    let (tx, rx) = flume::bounded(0);
    let closing = CancellationToken::new();
    let acker = CountingAcker::default();

    let consumer = tokio::spawn(async move {
        let msg: Message = rx.recv_async().await.unwrap();
        msg.ack();
    });

    let outcome = deliver(Message::new("1", "x"), &tx, &closing, &acker).await;
    consumer.await.unwrap();

    assert_eq!(outcome, Outcome::Acked);
    assert_eq!(acker.acks.load(Ordering::SeqCst), 1);
    assert_eq!(acker.nacks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_deliver_relays_nack() {
    let (tx, rx) = flume::bounded(0);
    let closing = CancellationToken::new();
    let acker = CountingAcker::default();

    let consumer = tokio::spawn(async move {
        let msg: Message = rx.recv_async().await.unwrap();
        msg.nack();
        msg.ack();
    });

    let outcome = deliver(Message::new("1", "x"), &tx, &closing, &acker).await;
    consumer.await.unwrap();

    assert_eq!(outcome, Outcome::Nacked);
    assert_eq!(acker.acks.load(Ordering::SeqCst), 0);
    assert_eq!(acker.nacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deliver_nacks_when_nobody_receives_before_closing() {
    let (tx, _rx) = flume::bounded::<Message>(0);
    let closing = CancellationToken::new();
    let acker = CountingAcker::default();

    let trigger = closing.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = timeout(
        Duration::from_secs(1),
        deliver(Message::new("1", "x"), &tx, &closing, &acker),
    )
    .await
    .expect("deliver should give up on closing");

    assert_eq!(outcome, Outcome::Closing);
    assert_eq!(acker.nacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deliver_nacks_in_flight_message_on_closing() {
    let (tx, rx) = flume::bounded(0);
    let closing = CancellationToken::new();
    let acker = CountingAcker::default();

    let trigger = closing.clone();
    let consumer = tokio::spawn(async move {
        let msg: Message = rx.recv_async().await.unwrap();
        trigger.cancel();
        msg
    });

    let outcome = deliver(Message::new("1", "x"), &tx, &closing, &acker).await;
    let held = consumer.await.unwrap();

    assert_eq!(outcome, Outcome::Closing);
    assert_eq!(acker.nacks.load(Ordering::SeqCst), 1);
    assert_eq!(acker.acks.load(Ordering::SeqCst), 0);
    // a late ack from the consumer is not relayed
    held.ack();
    assert_eq!(acker.acks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_deliver_nacks_when_consumer_is_gone() {
    let (tx, rx) = flume::bounded::<Message>(0);
    drop(rx);
    let closing = CancellationToken::new();
    let acker = CountingAcker::default();

    let outcome = deliver(Message::new("1", "x"), &tx, &closing, &acker).await;
    assert_eq!(outcome, Outcome::Disconnected);
    assert!(!outcome.keep_receiving());
    assert_eq!(acker.nacks.load(Ordering::SeqCst), 1);
}
