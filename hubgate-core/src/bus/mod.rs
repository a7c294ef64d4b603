//! Bus transport seam.
//!
//! The producer and consumer layers talk to the event bus only through the
//! traits in this module. A transport supplies three kinds of clients:
//!
//! ```text
//! BusConnector ──┬── ProducerTransport   create_batch / send_batch (shared, long-lived)
//!                ├── PartitionProbe      partition_properties (per receive call)
//!                └── PartitionReader     receive_batch (per receive call, exclusive)
//! ```
//!
//! [`InMemoryEventHub`] implements the full contract in-process.

mod batch;
mod memory;

pub use batch::{BatchOptions, EventData, EventDataBatch};
pub use memory::{HubStats, InMemoryEventHub};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::TransportError;
use crate::config::{BusConnectionConfig, RetryPolicy};

/// An event as delivered to a reader, with its position in the partition.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    pub data: EventData,
    pub partition_id: String,
    pub sequence_number: i64,
    pub offset: i64,
    pub enqueued_time: DateTime<Utc>,
}

impl ReceivedEvent {
    pub fn body(&self) -> Option<&[u8]> {
        self.data.body()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionProperties {
    pub hub_name: String,
    pub partition_id: String,
    pub beginning_sequence_number: i64,
    /// -1 when nothing was ever enqueued
    pub last_enqueued_sequence_number: i64,
    pub last_enqueued_offset: i64,
    pub last_enqueued_time: Option<DateTime<Utc>>,
    pub is_empty: bool,
}

/// Where a new reader starts in the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPosition {
    Earliest,
    /// Immediately after the last event enqueued when the reader attaches
    Latest,
    /// Inclusive
    FromSequenceNumber(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    /// `Some` makes the reader exclusive. A claim preempts any current
    /// owner whose level is lower or equal.
    pub owner_level: Option<i64>,
}

#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect_producer(
        &self,
        config: &BusConnectionConfig,
        retry: &RetryPolicy,
    ) -> Result<Arc<dyn ProducerTransport>, TransportError>;

    async fn connect_probe(
        &self,
        config: &BusConnectionConfig,
        consumer_group: &str,
    ) -> Result<Box<dyn PartitionProbe>, TransportError>;

    async fn open_reader(
        &self,
        config: &BusConnectionConfig,
        consumer_group: &str,
        partition_id: &str,
        position: EventPosition,
        options: &ReaderOptions,
    ) -> Result<Box<dyn PartitionReader>, TransportError>;
}

#[async_trait]
pub trait ProducerTransport: Send + Sync {
    fn is_closed(&self) -> bool;

    async fn create_batch(&self, options: BatchOptions) -> Result<EventDataBatch, TransportError>;

    async fn send_batch(&self, batch: &EventDataBatch) -> Result<(), TransportError>;

    async fn close(&self);
}

#[async_trait]
pub trait PartitionProbe: Send + Sync {
    async fn partition_properties(
        &self,
        partition_id: &str,
    ) -> Result<PartitionProperties, TransportError>;

    async fn close(&mut self);
}

#[async_trait]
pub trait PartitionReader: Send + Sync {
    /// Waits up to `max_wait` for at least one event and returns at most
    /// `max_count`. An empty result means nothing arrived in time or the
    /// pull was cancelled.
    async fn receive_batch(
        &mut self,
        max_count: usize,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReceivedEvent>, TransportError>;

    async fn close(&mut self);
}
