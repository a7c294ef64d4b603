use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::bus::{BatchOptions, EventData};
use crate::codec;
use crate::producer::ProducerClientManager;
use crate::record::EventRecord;
use crate::retry::RetryFailure;
use crate::{HubError, HubResult, TransportError};

/// Publishing side of the facade.
#[automock]
#[async_trait]
pub trait PublishEvents: Send + Sync {
    async fn publish(&self, record: &EventRecord) -> HubResult<()>;
}

/// Publishes single events to one partition through the shared producer.
pub struct EventSender {
    producer: Arc<ProducerClientManager>,
    partition_id: String,
}

impl EventSender {
    /// Targets the partition named in the producer's connection config.
    pub fn new(producer: Arc<ProducerClientManager>) -> Self {
        let partition_id = producer.config().partition_id.clone();
        Self {
            producer,
            partition_id,
        }
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub async fn send<T: Serialize + Sync + ?Sized>(&self, payload: &T) -> HubResult<()> {
        self.send_to_partition(payload, &self.partition_id).await
    }

    /// Encodes `payload` and publishes it as a one-event batch pinned to
    /// `partition_id`. Returns once the bus has accepted the batch.
    #[instrument(level = "debug", skip(self, payload), err(level = "warn"))]
    pub async fn send_to_partition<T: Serialize + Sync + ?Sized>(
        &self,
        payload: &T,
        partition_id: &str,
    ) -> HubResult<()> {
        let body = codec::encode(payload)?;
        let producer = self.producer.ensure_producer().await?;
        let retry = self.producer.retry_policy();

        let options = BatchOptions::for_partition(partition_id);
        let mut batch = retry
            .run("create_batch", || producer.create_batch(options.clone()))
            .await
            .map_err(publish_error)?;

        let event = EventData::new(body);
        let size = event.size_in_bytes();
        if !batch.try_add(event) {
            return Err(HubError::PayloadTooLarge {
                size,
                max: batch.max_size_in_bytes(),
            });
        }

        retry
            .run("send_batch", || producer.send_batch(&batch))
            .await
            .map_err(publish_error)?;

        debug!("published {} bytes to partition {}", size, partition_id);
        Ok(())
    }
}

fn publish_error(failure: RetryFailure) -> HubError {
    match failure.error {
        TransportError::Closed => HubError::Closed,
        error => HubError::Publish {
            attempts: failure.attempts,
            source: error,
        },
    }
}

#[async_trait]
impl PublishEvents for EventSender {
    async fn publish(&self, record: &EventRecord) -> HubResult<()> {
        self.send(record).await
    }
}
