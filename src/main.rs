use std::time::Duration;

use bytes::Bytes;
use tracing::info;

use popsub_bridge::cloud::{
    CloudPublisher, CloudPublisherConfig, CloudSubscriber, CloudSubscriberConfig,
};
use popsub_bridge::config::load_config;
use popsub_bridge::memory::MemoryBroker;
use popsub_bridge::message::{Message, new_uuid};
use popsub_bridge::utils::logging;
use popsub_bridge::{Publisher, Subscriber};

const TOPIC: &str = "greetings";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init(&config.logging.level);

    let broker = MemoryBroker::new();
    let subscriber =
        CloudSubscriber::connect(&broker, CloudSubscriberConfig::from_settings(&config.cloud))
            .await?;
    let publisher =
        CloudPublisher::connect(&broker, CloudPublisherConfig::from_settings(&config.cloud))
            .await?;

    let output = subscriber.subscribe(TOPIC).await?;
    publisher
        .publish(TOPIC, &[Message::new(new_uuid(), Bytes::from_static(b"hello"))])
        .await?;

    match tokio::time::timeout(Duration::from_secs(5), output.recv_async()).await {
        Ok(Ok(msg)) => {
            info!(
                message_uuid = %msg.uuid,
                payload = %String::from_utf8_lossy(&msg.payload),
                "Received message"
            );
            msg.ack();
        }
        Ok(Err(_)) => info!("Subscription closed before a message arrived"),
        Err(_) => info!("No message within 5s"),
    }

    publisher.close().await?;
    subscriber.close().await?;
    Ok(())
}
