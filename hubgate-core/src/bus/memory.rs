//! In-process event hub.
//!
//! A namespace of hubs, each with a fixed set of append-only partitions.
//! Sequence numbers start at 0 and offsets are byte positions, so the log
//! looks the same to readers as a managed hub would. Exclusive readers are
//! tracked per partition: a claim at a lower-or-equal owner level takes the
//! partition over and the previous reader fails its next pull.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::{
    BatchOptions, BusConnector, EventDataBatch, EventPosition, PartitionProbe,
    PartitionProperties, PartitionReader, ProducerTransport, ReaderOptions, ReceivedEvent,
};
use crate::TransportError;
use crate::config::{BusConnectionConfig, RetryPolicy};

/// Event Hubs standard tier limit
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1024 * 1024;

/// Counters exposed for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub producers_created: usize,
    pub probes_opened: usize,
    pub probes_closed: usize,
    pub readers_opened: usize,
    pub readers_closed: usize,
    pub batches_published: usize,
}

#[derive(Default)]
struct Counters {
    producers_created: AtomicUsize,
    probes_opened: AtomicUsize,
    probes_closed: AtomicUsize,
    readers_opened: AtomicUsize,
    readers_closed: AtomicUsize,
    batches_published: AtomicUsize,
}

struct Namespace {
    hubs: DashMap<String, Arc<HubState>>,
    max_batch_size: usize,
    failing_sends: AtomicU32,
    counters: Counters,
}

struct HubState {
    name: String,
    partitions: Vec<Arc<PartitionState>>,
    next_partition: AtomicUsize,
}

impl HubState {
    fn partition(&self, partition_id: &str) -> Result<&Arc<PartitionState>, TransportError> {
        self.partitions
            .iter()
            .find(|p| p.id == partition_id)
            .ok_or_else(|| TransportError::PartitionNotFound {
                hub_name: self.name.clone(),
                partition_id: partition_id.to_string(),
            })
    }
}

struct Ownership {
    level: i64,
    reader_id: Uuid,
}

struct PartitionState {
    id: String,
    log: RwLock<Vec<ReceivedEvent>>,
    appended: Notify,
    owner: Mutex<Option<Ownership>>,
}

impl PartitionState {
    fn new(id: String) -> Self {
        Self {
            id,
            log: RwLock::new(Vec::new()),
            appended: Notify::new(),
            owner: Mutex::new(None),
        }
    }
}

/// Cloneable handle to one in-process namespace.
#[derive(Clone)]
pub struct InMemoryEventHub {
    inner: Arc<Namespace>,
}

impl Default for InMemoryEventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventHub {
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_BATCH_SIZE)
    }

    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            inner: Arc::new(Namespace {
                hubs: DashMap::new(),
                max_batch_size,
                failing_sends: AtomicU32::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Creates `hub_name` with partitions "0".."partition_count-1".
    /// An existing hub of the same name is kept as is.
    pub fn create_hub(&self, hub_name: &str, partition_count: usize) {
        self.inner
            .hubs
            .entry(hub_name.to_string())
            .or_insert_with(|| {
                Arc::new(HubState {
                    name: hub_name.to_string(),
                    partitions: (0..partition_count)
                        .map(|i| Arc::new(PartitionState::new(i.to_string())))
                        .collect(),
                    next_partition: AtomicUsize::new(0),
                })
            });
    }

    /// Makes the next `count` publish calls fail with a transient error.
    pub fn fail_next_sends(&self, count: u32) {
        self.inner.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Snapshot of a partition's log.
    pub async fn events(
        &self,
        hub_name: &str,
        partition_id: &str,
    ) -> Result<Vec<ReceivedEvent>, TransportError> {
        let hub = self.hub(hub_name)?;
        let partition = hub.partition(partition_id)?;
        Ok(partition.log.read().await.clone())
    }

    pub fn stats(&self) -> HubStats {
        let c = &self.inner.counters;
        HubStats {
            producers_created: c.producers_created.load(Ordering::SeqCst),
            probes_opened: c.probes_opened.load(Ordering::SeqCst),
            probes_closed: c.probes_closed.load(Ordering::SeqCst),
            readers_opened: c.readers_opened.load(Ordering::SeqCst),
            readers_closed: c.readers_closed.load(Ordering::SeqCst),
            batches_published: c.batches_published.load(Ordering::SeqCst),
        }
    }

    fn hub(&self, hub_name: &str) -> Result<Arc<HubState>, TransportError> {
        self.inner
            .hubs
            .get(hub_name)
            .map(|hub| hub.value().clone())
            .ok_or_else(|| TransportError::HubNotFound {
                hub_name: hub_name.to_string(),
            })
    }

    fn resolve(&self, config: &BusConnectionConfig) -> Result<Arc<HubState>, TransportError> {
        let properties = config.connection_properties()?;
        if !properties.is_in_memory() {
            return Err(TransportError::InvalidConnectionString(format!(
                "in-memory hub cannot serve scheme '{}'",
                properties.scheme
            )));
        }
        self.hub(&config.hub_name)
    }
}

#[async_trait]
impl BusConnector for InMemoryEventHub {
    async fn connect_producer(
        &self,
        config: &BusConnectionConfig,
        _retry: &RetryPolicy,
    ) -> Result<Arc<dyn ProducerTransport>, TransportError> {
        let hub = self.resolve(config)?;
        self.inner
            .counters
            .producers_created
            .fetch_add(1, Ordering::SeqCst);
        debug!("in-memory producer connected to {}", hub.name);
        Ok(Arc::new(InMemoryProducer {
            hub,
            namespace: self.inner.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn connect_probe(
        &self,
        config: &BusConnectionConfig,
        _consumer_group: &str,
    ) -> Result<Box<dyn PartitionProbe>, TransportError> {
        let hub = self.resolve(config)?;
        self.inner
            .counters
            .probes_opened
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryProbe {
            hub,
            namespace: self.inner.clone(),
            closed: false,
        }))
    }

    async fn open_reader(
        &self,
        config: &BusConnectionConfig,
        _consumer_group: &str,
        partition_id: &str,
        position: EventPosition,
        options: &ReaderOptions,
    ) -> Result<Box<dyn PartitionReader>, TransportError> {
        let hub = self.resolve(config)?;
        let partition = hub.partition(partition_id)?.clone();
        let reader_id = Uuid::new_v4();

        if let Some(level) = options.owner_level {
            let mut owner = partition.owner.lock().await;
            if let Some(current) = owner.as_ref() {
                if current.level > level {
                    return Err(TransportError::OwnershipDenied {
                        partition_id: partition.id.clone(),
                        current: current.level,
                        requested: level,
                    });
                }
                debug!(
                    "reader {} preempts {} on partition {}",
                    reader_id, current.reader_id, partition.id
                );
            }
            *owner = Some(Ownership { level, reader_id });
            // wake a preempted reader so it notices the takeover
            partition.appended.notify_waiters();
        }

        let cursor = {
            let log = partition.log.read().await;
            match position {
                EventPosition::Earliest => 0,
                EventPosition::Latest => log.len(),
                EventPosition::FromSequenceNumber(seq) => (seq.max(0) as usize).min(log.len()),
            }
        };

        self.inner
            .counters
            .readers_opened
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryReader {
            partition,
            namespace: self.inner.clone(),
            reader_id,
            exclusive: options.owner_level.is_some(),
            cursor,
            closed: false,
        }))
    }
}

struct InMemoryProducer {
    hub: Arc<HubState>,
    namespace: Arc<Namespace>,
    closed: AtomicBool,
}

#[async_trait]
impl ProducerTransport for InMemoryProducer {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn create_batch(&self, options: BatchOptions) -> Result<EventDataBatch, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if let Some(partition_id) = &options.partition_id {
            self.hub.partition(partition_id)?;
        }
        let max = options
            .max_size_in_bytes
            .map_or(self.namespace.max_batch_size, |max| {
                max.min(self.namespace.max_batch_size)
            });
        Ok(EventDataBatch::new(options.partition_id, max))
    }

    async fn send_batch(&self, batch: &EventDataBatch) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let injected = self
            .namespace
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(TransportError::ServiceBusy(
                "injected transient failure".to_string(),
            ));
        }
        if batch.is_empty() {
            return Ok(());
        }

        let partition = match batch.partition_id() {
            Some(partition_id) => self.hub.partition(partition_id)?,
            None => {
                let next = self.hub.next_partition.fetch_add(1, Ordering::SeqCst);
                let count = self.hub.partitions.len();
                if count == 0 {
                    return Err(TransportError::PartitionNotFound {
                        hub_name: self.hub.name.clone(),
                        partition_id: String::new(),
                    });
                }
                &self.hub.partitions[next % count]
            }
        };

        {
            let mut log = partition.log.write().await;
            let mut offset = log
                .last()
                .map_or(0, |last| last.offset + last.data.size_in_bytes() as i64);
            for data in batch.events() {
                let size = data.size_in_bytes() as i64;
                let sequence_number = log.len() as i64;
                log.push(ReceivedEvent {
                    data: data.clone(),
                    partition_id: partition.id.clone(),
                    sequence_number,
                    offset,
                    enqueued_time: Utc::now(),
                });
                offset += size;
            }
        }
        partition.appended.notify_waiters();
        self.namespace
            .counters
            .batches_published
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct InMemoryProbe {
    hub: Arc<HubState>,
    namespace: Arc<Namespace>,
    closed: bool,
}

#[async_trait]
impl PartitionProbe for InMemoryProbe {
    async fn partition_properties(
        &self,
        partition_id: &str,
    ) -> Result<PartitionProperties, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let partition = self.hub.partition(partition_id)?;
        let log = partition.log.read().await;
        let last = log.last();
        Ok(PartitionProperties {
            hub_name: self.hub.name.clone(),
            partition_id: partition.id.clone(),
            beginning_sequence_number: if log.is_empty() { -1 } else { 0 },
            last_enqueued_sequence_number: last.map_or(-1, |e| e.sequence_number),
            last_enqueued_offset: last.map_or(-1, |e| e.offset),
            last_enqueued_time: last.map(|e| e.enqueued_time),
            is_empty: log.is_empty(),
        })
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.namespace
                .counters
                .probes_closed
                .fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct InMemoryReader {
    partition: Arc<PartitionState>,
    namespace: Arc<Namespace>,
    reader_id: Uuid,
    exclusive: bool,
    cursor: usize,
    closed: bool,
}

impl InMemoryReader {
    async fn still_owner(&self) -> bool {
        if !self.exclusive {
            return true;
        }
        self.partition
            .owner
            .lock()
            .await
            .as_ref()
            .is_some_and(|owner| owner.reader_id == self.reader_id)
    }
}

#[async_trait]
impl PartitionReader for InMemoryReader {
    async fn receive_batch(
        &mut self,
        max_count: usize,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReceivedEvent>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            // registered before the log is checked so an append in between still wakes us
            let appended = self.partition.appended.notified();

            if !self.still_owner().await {
                return Err(TransportError::OwnershipLost {
                    partition_id: self.partition.id.clone(),
                });
            }

            {
                let log = self.partition.log.read().await;
                if log.len() > self.cursor {
                    let end = (self.cursor + max_count.max(1)).min(log.len());
                    let events = log[self.cursor..end].to_vec();
                    self.cursor = end;
                    return Ok(events);
                }
            }

            tokio::select! {
                _ = appended => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
                _ = cancel.cancelled() => return Ok(Vec::new()),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.exclusive {
            let mut owner = self.partition.owner.lock().await;
            if owner
                .as_ref()
                .is_some_and(|owner| owner.reader_id == self.reader_id)
            {
                *owner = None;
            }
        }
        self.namespace
            .counters
            .readers_closed
            .fetch_add(1, Ordering::SeqCst);
    }
}
