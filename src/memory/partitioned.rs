use std::sync::Arc;

use async_trait::async_trait;

use super::{ConnectionState, MemoryBroker};
use crate::partitioned::transport::{
    ConsumerRecord, InitialOffset, PartitionedClient, PartitionedConnector, ProducerRecord,
    RecordPosition,
};
use crate::utils::error::TransportError;

struct MemoryPartitionedClient {
    broker: MemoryBroker,
    state: ConnectionState,
}

#[async_trait]
impl PartitionedConnector for MemoryBroker {
    async fn connect(
        &self,
        brokers: &[String],
        _client_id: &str,
    ) -> Result<Arc<dyn PartitionedClient>, TransportError> {
        self.check_available()?;
        if brokers.is_empty() {
            return Err(TransportError::Unavailable("no brokers given".to_string()));
        }
        Ok(Arc::new(MemoryPartitionedClient {
            broker: self.clone(),
            state: ConnectionState::default(),
        }))
    }
}

#[async_trait]
impl PartitionedClient for MemoryPartitionedClient {
    async fn produce(
        &self,
        topic: &str,
        record: ProducerRecord,
    ) -> Result<RecordPosition, TransportError> {
        self.state.check_open()?;
        Ok(self.broker.engine.lock().produce(topic, record))
    }

    async fn fetch(
        &self,
        group: &str,
        topic: &str,
        initial: InitialOffset,
    ) -> Result<ConsumerRecord, TransportError> {
        loop {
            self.state.check_open()?;
            let notify = self.broker.engine.lock().log_notify(topic);
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let fetched = self.broker.engine.lock().fetch(group, topic, initial);
            if let Some(record) = fetched {
                return Ok(record);
            }
            notified.await;
        }
    }

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: u64,
    ) -> Result<(), TransportError> {
        self.state.check_open()?;
        self.broker
            .engine
            .lock()
            .commit(group, topic, partition, offset);
        Ok(())
    }

    async fn seek(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: u64,
    ) -> Result<(), TransportError> {
        self.state.check_open()?;
        self.broker.engine.lock().seek(group, topic, partition, offset);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.close()
    }
}
