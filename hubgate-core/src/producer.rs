use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::bus::{BusConnector, ProducerTransport};
use crate::config::{BusConnectionConfig, RetryPolicy};
use crate::{HubError, HubResult};

/// Owns the one shared publishing connection.
///
/// The handle is created on first use, and again whenever the current one
/// reports closed. Creation runs under a lock so concurrent first callers
/// end up sharing a single handle. Once created, the handle is handed out
/// as an `Arc` and used without further locking.
pub struct ProducerClientManager {
    connector: Arc<dyn BusConnector>,
    config: BusConnectionConfig,
    retry: RetryPolicy,
    handle: Mutex<Option<Arc<dyn ProducerTransport>>>,
}

impl ProducerClientManager {
    pub fn new(
        connector: Arc<dyn BusConnector>,
        config: BusConnectionConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            connector,
            config,
            retry,
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BusConnectionConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the live producer, connecting a new one if needed.
    #[instrument(level = "debug", skip(self), fields(hub = %self.config.hub_name), err)]
    pub async fn ensure_producer(&self) -> HubResult<Arc<dyn ProducerTransport>> {
        let mut handle = self.handle.lock().await;
        if let Some(producer) = handle.as_ref() {
            if !producer.is_closed() {
                return Ok(producer.clone());
            }
            debug!("producer handle was closed, reconnecting");
        }

        let producer = self
            .connector
            .connect_producer(&self.config, &self.retry)
            .await
            .map_err(HubError::Connectivity)?;
        info!("producer connected to hub {}", self.config.hub_name);
        *handle = Some(producer.clone());
        Ok(producer)
    }

    /// Closes the live producer, if any. Meant for process shutdown.
    pub async fn close(&self) {
        if let Some(producer) = self.handle.lock().await.take() {
            producer.close().await;
            info!("producer for hub {} closed", self.config.hub_name);
        }
    }
}
