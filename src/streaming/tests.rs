use super::transport::{
    ConnectOptions, MessageStream, StreamingConnection, StreamingConnector, SubscriptionOptions,
};
use super::{
    StreamingPublisher, StreamingPublisherConfig, StreamingSubscriber, StreamingSubscriberConfig,
    valid_client_id,
};
use crate::marshal::{JsonMarshaler, Marshaler};
use crate::memory::MemoryBroker;
use crate::message::Message;
use crate::pubsub::{Publisher, Subscriber};
use crate::utils::error::{CodecError, Error, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

/// Poll `check` until it holds; acks are relayed to the broker asynchronously.
async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

fn publisher_config() -> StreamingPublisherConfig {
    StreamingPublisherConfig::new("test-cluster", "publisher").with_marshaler(JsonMarshaler)
}

fn durable_config(client_id: &str) -> StreamingSubscriberConfig {
    let mut config = StreamingSubscriberConfig::new("test-cluster", client_id);
    config.durable_name = Some("durable".to_string());
    config
}

#[test]
fn test_valid_client_id() {
    assert!(valid_client_id("orders-service_1"));
    assert!(!valid_client_id("orders service"));
    assert!(!valid_client_id("orders.service"));
    assert!(!valid_client_id(""));
}

#[tokio::test]
async fn test_publish_batch_delivers_each_message() {
    let broker = MemoryBroker::new();
    let sub = StreamingSubscriber::connect(&broker, durable_config("consumer"))
        .await
        .unwrap();
    let output = sub.subscribe("orders").await.unwrap();

    let publ = StreamingPublisher::connect(&broker, publisher_config())
        .await
        .unwrap();
    let mut first = Message::new("m1", Bytes::from_static(b"one"));
    first.metadata.insert("k".to_string(), "v".to_string());
    publ.publish("orders", &[first, Message::new("m2", Bytes::from_static(b"two"))])
        .await
        .unwrap();

    let a = timeout(WAIT, output.recv_async()).await.unwrap().unwrap();
    assert_eq!(a.uuid, "m1");
    assert_eq!(a.metadata.get("k").map(String::as_str), Some("v"));
    assert!(a.ack());

    let b = timeout(WAIT, output.recv_async()).await.unwrap().unwrap();
    assert_eq!(b.uuid, "m2");
    assert_eq!(b.payload, Bytes::from_static(b"two"));
    assert!(b.ack());

    eventually(|| broker.acked_count("consumer.orders.durable") == 2).await;
    sub.close().await.unwrap();
}

#[tokio::test]
async fn test_next_message_waits_for_ack() {
    let broker = MemoryBroker::new();
    let sub = StreamingSubscriber::connect(&broker, durable_config("consumer"))
        .await
        .unwrap();
    let output = sub.subscribe("orders").await.unwrap();
    let publ = StreamingPublisher::connect(&broker, publisher_config())
        .await
        .unwrap();
    publ.publish(
        "orders",
        &[
            Message::new("m1", Bytes::from_static(b"one")),
            Message::new("m2", Bytes::from_static(b"two")),
        ],
    )
    .await
    .unwrap();

    let first = timeout(WAIT, output.recv_async()).await.unwrap().unwrap();
    assert!(
        timeout(Duration::from_millis(100), output.recv_async())
            .await
            .is_err()
    );
    first.ack();

    let second = timeout(WAIT, output.recv_async()).await.unwrap().unwrap();
    assert_eq!(second.uuid, "m2");
    second.ack();
    sub.close().await.unwrap();
}

#[tokio::test]
async fn test_publisher_requires_marshaler() {
    let broker = MemoryBroker::new();
    let err = StreamingPublisher::connect(
        &broker,
        StreamingPublisherConfig::new("test-cluster", "publisher"),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(err, Error::Configuration(ref m) if m.contains("marshaler")));
}

#[tokio::test]
async fn test_invalid_client_id_is_rejected() {
    let broker = MemoryBroker::new();
    let err = StreamingSubscriber::connect(
        &broker,
        StreamingSubscriberConfig::new("test-cluster", "bad id"),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn test_many_consumers_need_queue_group() {
    let broker = MemoryBroker::new();
    let mut config = StreamingSubscriberConfig::new("test-cluster", "consumer");
    config.subscribers_count = 3;

    let err = StreamingSubscriber::connect(&broker, config.clone())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Configuration(_)));

    config.queue_group = Some("workers".to_string());
    let sub = StreamingSubscriber::connect(&broker, config).await.unwrap();
    let _output = sub.subscribe("orders").await.unwrap();
    assert!(broker.has_subscription("orders.workers"));
    sub.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_fails_when_server_unreachable() {
    let broker = MemoryBroker::new();
    broker.set_available(false);

    let err = StreamingPublisher::connect(&broker, publisher_config())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Connection { backend: "streaming", .. }));
}

#[tokio::test]
async fn test_publish_after_close_fails() {
    let broker = MemoryBroker::new();
    let publ = StreamingPublisher::connect(&broker, publisher_config())
        .await
        .unwrap();
    publ.close().await.unwrap();

    let err = publ
        .publish("orders", &[Message::new("late", Bytes::new())])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Delivery { .. }));
}

#[tokio::test]
async fn test_garbage_frame_is_nacked_and_skipped() {
    let broker = MemoryBroker::new();
    let sub = StreamingSubscriber::connect(&broker, durable_config("consumer"))
        .await
        .unwrap();
    let output = sub.subscribe("orders").await.unwrap();

    let conn = StreamingConnector::connect(
        &broker,
        "test-cluster",
        "raw",
        &Default::default(),
    )
    .await
    .unwrap();
    conn.publish("orders", Bytes::from_static(b"not json"))
        .await
        .unwrap();

    timeout(WAIT, async {
        while broker.nacked_count("consumer.orders.durable") == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(output.try_recv().is_err());

    sub.close().await.unwrap();
}

#[tokio::test]
async fn test_close_nacks_in_flight_message_and_ends_output() {
    let broker = MemoryBroker::new();
    let sub = StreamingSubscriber::connect(&broker, durable_config("consumer"))
        .await
        .unwrap();
    let output = sub.subscribe("orders").await.unwrap();
    StreamingPublisher::connect(&broker, publisher_config())
        .await
        .unwrap()
        .publish("orders", &[Message::new("m1", Bytes::from_static(b"one"))])
        .await
        .unwrap();

    let held = timeout(WAIT, output.recv_async()).await.unwrap().unwrap();
    timeout(WAIT, sub.close()).await.unwrap().unwrap();

    assert_eq!(broker.nacked_count("consumer.orders.durable"), 1);
    // the durable subscription keeps the message for the next consumer
    assert_eq!(broker.queued_count("consumer.orders.durable"), 1);
    held.ack();
    assert_eq!(broker.acked_count("consumer.orders.durable"), 0);
    assert!(output.recv_async().await.is_err());

    let err = sub.subscribe("orders").await.unwrap_err();
    assert!(matches!(err, Error::SubscriberClosed));
}

#[tokio::test]
async fn test_ephemeral_subscription_is_removed_on_close() {
    let broker = MemoryBroker::new();
    let sub = StreamingSubscriber::connect(
        &broker,
        StreamingSubscriberConfig::new("test-cluster", "consumer"),
    )
    .await
    .unwrap();
    let _output = sub.subscribe("orders").await.unwrap();
    assert_eq!(broker.subscription_count(), 1);

    sub.close().await.unwrap();
    assert_eq!(broker.subscription_count(), 0);
}

#[tokio::test]
async fn test_marshal_failure_stops_the_batch() {
    struct RejectUuid(&'static str);
    impl Marshaler<Bytes> for RejectUuid {
        fn marshal(&self, topic: &str, msg: &Message) -> Result<Bytes, CodecError> {
            if msg.uuid == self.0 {
                return Err(CodecError::Invalid(format!("cannot encode {}", msg.uuid)));
            }
            JsonMarshaler.marshal(topic, msg)
        }
    }

    let broker = MemoryBroker::new();
    let sub = StreamingSubscriber::connect(&broker, durable_config("consumer"))
        .await
        .unwrap();
    let output = sub.subscribe("orders").await.unwrap();
    let publ = StreamingPublisher::connect(
        &broker,
        StreamingPublisherConfig::new("test-cluster", "publisher").with_marshaler(RejectUuid("b")),
    )
    .await
    .unwrap();

    let err = publ
        .publish(
            "orders",
            &[
                Message::new("a", Bytes::from_static(b"1")),
                Message::new("b", Bytes::from_static(b"2")),
                Message::new("c", Bytes::from_static(b"3")),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Codec(CodecError::Invalid(_))));

    let first = timeout(WAIT, output.recv_async()).await.unwrap().unwrap();
    assert_eq!(first.uuid, "a");
    first.ack();
    eventually(|| broker.acked_count("consumer.orders.durable") == 1).await;
    assert_eq!(broker.queued_count("consumer.orders.durable"), 0);

    sub.close().await.unwrap();
}

/// Connection whose `subscribe` holds the stream back until released.
struct HeldConnection {
    inner: Arc<dyn StreamingConnection>,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl StreamingConnection for HeldConnection {
    async fn publish(&self, subject: &str, data: Bytes) -> Result<(), TransportError> {
        self.inner.publish(subject, data).await
    }

    async fn subscribe(
        &self,
        subject: &str,
        options: &SubscriptionOptions,
        cancel: CancellationToken,
    ) -> Result<MessageStream, TransportError> {
        let stream = self.inner.subscribe(subject, options, cancel).await?;
        self.entered.notify_one();
        self.release.notified().await;
        Ok(stream)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.close().await
    }
}

struct HeldConnector {
    broker: MemoryBroker,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl StreamingConnector for HeldConnector {
    async fn connect(
        &self,
        cluster_id: &str,
        client_id: &str,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn StreamingConnection>, TransportError> {
        let inner = StreamingConnector::connect(&self.broker, cluster_id, client_id, options).await?;
        Ok(Arc::new(HeldConnection {
            inner,
            entered: self.entered.clone(),
            release: self.release.clone(),
        }))
    }
}

#[tokio::test]
async fn test_close_during_subscribe_returns_closed() {
    let connector = HeldConnector {
        broker: MemoryBroker::new(),
        entered: Arc::new(Notify::new()),
        release: Arc::new(Notify::new()),
    };
    let (entered, release) = (connector.entered.clone(), connector.release.clone());
    let sub = Arc::new(
        StreamingSubscriber::connect(&connector, durable_config("consumer"))
            .await
            .unwrap(),
    );

    let subscribing = tokio::spawn({
        let sub = sub.clone();
        async move { sub.subscribe("orders").await }
    });
    timeout(WAIT, entered.notified()).await.unwrap();

    timeout(WAIT, sub.close()).await.unwrap().unwrap();
    release.notify_one();

    let result = timeout(WAIT, subscribing).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::SubscriberClosed)));
}
