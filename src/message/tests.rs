use super::{AckState, Message, new_uuid};
use std::time::Duration;
use tokio::time::timeout;

#[test]
fn test_message_new() {
    let msg = Message::new("1", "x").with_metadata("k", "v");
    assert_eq!(msg.uuid, "1");
    assert_eq!(&msg.payload[..], b"x");
    assert_eq!(msg.metadata.get("k").map(String::as_str), Some("v"));
    assert_eq!(msg.state(), AckState::Pending);
}

#[test]
fn test_new_uuid_is_unique() {
    assert_ne!(new_uuid(), new_uuid());
}

#[test]
fn test_ack_is_idempotent() {
    let msg = Message::new("1", "x");
    assert!(msg.ack());
    assert!(msg.ack());
    assert!(!msg.nack());
    assert_eq!(msg.state(), AckState::Acked);
}

#[test]
fn test_nack_is_idempotent() {
    let msg = Message::new("1", "x");
    assert!(msg.nack());
    assert!(msg.nack());
    assert!(!msg.ack());
    assert_eq!(msg.state(), AckState::Nacked);
}

#[test]
fn test_clones_share_state() {
    let msg = Message::new("1", "x");
    let clone = msg.clone();
    clone.ack();
    assert_eq!(msg.state(), AckState::Acked);
}

#[tokio::test]
async fn test_acked_signal_fires_after_ack() {
    let msg = Message::new("1", "x");
    let observer = msg.clone();
    let waiter = tokio::spawn(async move { observer.acked().await });

    msg.ack();
    timeout(Duration::from_secs(1), waiter)
        .await
        .expect("acked signal did not fire")
        .unwrap();
}

#[tokio::test]
async fn test_only_one_signal_fires() {
    let msg = Message::new("1", "x");
    msg.nack();

    timeout(Duration::from_millis(100), msg.nacked())
        .await
        .expect("nacked signal did not fire");
    assert!(
        timeout(Duration::from_millis(50), msg.acked()).await.is_err(),
        "acked must not fire for a nacked message"
    );
}

#[tokio::test]
async fn test_signal_fires_for_late_waiter() {
    let msg = Message::new("1", "x");
    msg.ack();
    msg.ack();
    timeout(Duration::from_millis(100), msg.acked())
        .await
        .expect("acked should resolve when already acked");
}
