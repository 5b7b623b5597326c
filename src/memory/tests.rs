use super::MemoryBroker;
use super::engine::Engine;
use super::topic::Topic;
use crate::cloud::transport::{CloudClient, CloudConnector, OutgoingMessage, SubscriptionConfig};
use crate::partitioned::transport::{
    InitialOffset, PartitionedClient, PartitionedConnector, ProducerRecord,
};
use crate::pubsub::Acknowledger;
use crate::streaming::transport::{
    ConnectOptions, StreamingConnection, StreamingConnector, SubscriptionOptions,
};
use crate::utils::error::TransportError;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[test]
fn test_topic_bind_and_unbind() {
    let mut topic = Topic::new("orders");
    topic.bind("orders-sub".to_string());
    topic.bind("orders-sub".to_string());
    assert_eq!(topic.subscriptions.len(), 1);
    topic.unbind("orders-sub");
    assert!(topic.subscriptions.is_empty());
}

#[test]
fn test_engine_fans_out_to_every_subscription() {
    let mut engine = Engine::new(1);
    engine.create_topic("orders").unwrap();
    engine.create_subscription("a", "orders", 10_000).unwrap();
    engine.create_subscription("b", "orders", 10_000).unwrap();

    engine
        .publish("orders", Bytes::from_static(b"x"), Default::default())
        .unwrap();

    assert_eq!(engine.subscriptions["a"].queue.len(), 1);
    assert_eq!(engine.subscriptions["b"].queue.len(), 1);
}

#[test]
fn test_engine_publish_to_missing_topic_fails() {
    let mut engine = Engine::new(1);
    let err = engine
        .publish("nope", Bytes::new(), Default::default())
        .unwrap_err();
    assert!(matches!(err, TransportError::NotFound { kind: "topic", .. }));
}

#[test]
fn test_engine_nack_requeues_at_front() {
    let mut engine = Engine::new(1);
    engine.create_topic("orders").unwrap();
    engine.create_subscription("sub", "orders", 10_000).unwrap();
    engine
        .publish("orders", Bytes::from_static(b"1"), Default::default())
        .unwrap();
    engine
        .publish("orders", Bytes::from_static(b"2"), Default::default())
        .unwrap();

    let (id, first) = engine.pull("sub", 0).unwrap().unwrap();
    assert_eq!(&first.data[..], b"1");
    engine.handle_nack(id).unwrap();

    let (_, again) = engine.pull("sub", 0).unwrap().unwrap();
    assert_eq!(&again.data[..], b"1");
    assert_eq!(again.delivery_attempt, 2);
    assert_eq!(engine.subscriptions["sub"].nacked, 1);
}

#[test]
fn test_engine_drops_after_max_attempts() {
    let mut engine = Engine::new(1);
    engine.create_topic("orders").unwrap();
    engine.create_subscription("sub", "orders", 10_000).unwrap();
    engine
        .publish("orders", Bytes::from_static(b"1"), Default::default())
        .unwrap();

    for _ in 0..Engine::MAX_DELIVERY_ATTEMPTS {
        let (id, _) = engine.pull("sub", 0).unwrap().unwrap();
        engine.handle_nack(id).unwrap();
    }
    assert!(engine.pull("sub", 0).unwrap().is_none());
}

#[test]
fn test_engine_redelivers_after_ack_deadline() {
    let mut engine = Engine::new(1);
    engine.create_topic("orders").unwrap();
    engine.create_subscription("sub", "orders", 1_000).unwrap();
    engine
        .publish("orders", Bytes::from_static(b"1"), Default::default())
        .unwrap();

    let (id, _) = engine.pull("sub", 0).unwrap().unwrap();
    assert!(engine.pull("sub", 500).unwrap().is_none());

    let (_, again) = engine.pull("sub", 1_500).unwrap().unwrap();
    assert_eq!(again.delivery_attempt, 2);
    // the expired delivery can no longer be acked
    assert!(engine.handle_ack(id).is_err());
}

#[test]
fn test_engine_unknown_ack() {
    let mut engine = Engine::new(1);
    assert!(matches!(
        engine.handle_ack(42),
        Err(TransportError::NotFound { kind: "delivery", .. })
    ));
}

#[test]
fn test_engine_partitioned_fetch_commit_and_seek() {
    let mut engine = Engine::new(2);
    for value in ["a", "b", "c", "d"] {
        engine.produce(
            "events",
            ProducerRecord {
                value: Bytes::from(value),
                ..Default::default()
            },
        );
    }

    let mut seen = Vec::new();
    while let Some(record) = engine.fetch("g", "events", InitialOffset::Earliest) {
        seen.push(record);
    }
    assert_eq!(seen.len(), 4);

    let last = seen.last().unwrap();
    engine.commit("g", "events", last.partition, last.offset + 1);
    assert_eq!(
        engine.committed_offset("g", "events", last.partition),
        Some(last.offset + 1)
    );

    engine.seek("g", "events", last.partition, last.offset);
    let again = engine.fetch("g", "events", InitialOffset::Earliest).unwrap();
    assert_eq!(again.value, last.value);
}

#[test]
fn test_engine_fetch_rotates_across_partitions() {
    let mut engine = Engine::new(2);
    for _ in 0..6 {
        engine.produce("events", ProducerRecord::default());
    }

    let mut partitions = Vec::new();
    for _ in 0..4 {
        let record = engine
            .fetch("g", "events", InitialOffset::Earliest)
            .unwrap();
        partitions.push(record.partition);
    }
    assert_eq!(partitions, [0, 1, 0, 1]);
}

#[test]
fn test_engine_latest_skips_existing_records() {
    let mut engine = Engine::new(1);
    engine.produce("events", ProducerRecord::default());
    assert!(engine.fetch("g", "events", InitialOffset::Latest).is_none());
    engine.produce("events", ProducerRecord::default());
    assert_eq!(
        engine
            .fetch("g", "events", InitialOffset::Latest)
            .unwrap()
            .offset,
        1
    );
}

#[test]
fn test_engine_keyed_records_stay_on_one_partition() {
    let mut engine = Engine::new(4);
    let key = Some(Bytes::from_static(b"customer-1"));
    let first = engine.produce(
        "events",
        ProducerRecord {
            key: key.clone(),
            ..Default::default()
        },
    );
    let second = engine.produce(
        "events",
        ProducerRecord {
            key,
            ..Default::default()
        },
    );
    assert_eq!(first.partition, second.partition);
    assert_eq!(second.offset, first.offset + 1);
}

#[tokio::test]
async fn test_connect_fails_when_unavailable() {
    let broker = MemoryBroker::new();
    broker.set_available(false);
    let err = StreamingConnector::connect(&broker, "cluster", "client", &ConnectOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransportError::Unavailable(_)));

    broker.set_available(true);
    assert!(
        CloudConnector::connect(&broker, "project", &Default::default())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_streaming_stream_delivers_and_acks() {
    let broker = MemoryBroker::new();
    let conn = StreamingConnector::connect(&broker, "c", "client", &ConnectOptions::default())
        .await
        .unwrap();

    let options = SubscriptionOptions {
        durable_name: Some("durable".into()),
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let mut stream = conn.subscribe("orders", &options, cancel.clone()).await.unwrap();

    conn.publish("orders", Bytes::from_static(b"x")).await.unwrap();
    let msg = timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(&msg.data[..], b"x");
    assert!(!msg.redelivered);
    msg.acker.ack().await.unwrap();
    assert_eq!(broker.acked_count("client.orders.durable"), 1);

    cancel.cancel();
    assert!(stream.next().await.is_none());
    // durable subscriptions outlive their stream
    assert!(broker.has_subscription("client.orders.durable"));
}

#[tokio::test]
async fn test_streaming_ephemeral_subscription_is_removed() {
    let broker = MemoryBroker::new();
    let conn = StreamingConnector::connect(&broker, "c", "client", &ConnectOptions::default())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let stream = conn
        .subscribe("orders", &SubscriptionOptions::default(), cancel)
        .await
        .unwrap();
    assert_eq!(broker.subscription_count(), 1);
    drop(stream);
    assert_eq!(broker.subscription_count(), 0);
}

#[tokio::test]
async fn test_cloud_publish_requires_topic() {
    let broker = MemoryBroker::new();
    let client = CloudConnector::connect(&broker, "p", &Default::default())
        .await
        .unwrap();

    let ticket = client
        .publish("orders", OutgoingMessage::default())
        .await
        .unwrap();
    assert!(ticket.await.is_err());

    client.create_topic("orders").await.unwrap();
    let config = SubscriptionConfig {
        topic: "orders".into(),
        ..Default::default()
    };
    client.create_subscription("orders", &config).await.unwrap();
    let ticket = client
        .publish("orders", OutgoingMessage::default())
        .await
        .unwrap();
    assert!(!ticket.await.unwrap().is_empty());
    assert_eq!(broker.queued_count("orders"), 1);
}

#[tokio::test]
async fn test_closed_connection_rejects_operations() {
    let broker = MemoryBroker::new();
    let client = PartitionedConnector::connect(&broker, &["memory".to_string()], "client")
        .await
        .unwrap();
    client.close().await.unwrap();
    assert_eq!(
        client
            .produce("events", ProducerRecord::default())
            .await
            .unwrap_err(),
        TransportError::Disconnected
    );
    assert!(client.close().await.is_err());
}
