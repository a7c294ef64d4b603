//! Single-shot "latest event" consumption.
//!
//! Every call runs its own session through a fixed sequence of phases:
//!
//! ```text
//! Init ─► ProbeEmpty ─┬─► OpenReader ─► Pull ─► Decode ─► Done
//!                     └──────────── (partition empty) ──► Done
//! ```
//!
//! The probe client and the exclusive reader live in a [`ConsumerSession`]
//! that is closed after the phases finish, whatever the outcome. Nothing on
//! this path is retried.

use async_trait::async_trait;
use mockall::automock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, instrument, warn};

use crate::bus::{
    BusConnector, EventPosition, PartitionProbe, PartitionReader, ReaderOptions, ReceivedEvent,
};
use crate::codec;
use crate::config::{BusConnectionConfig, ReceiverOptions};
use crate::record::EventRecord;
use crate::{HubError, HubResult, TransportError};

/// How a receive call ended, without the payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr, strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ReceiveOutcome {
    Event,
    PartitionEmpty,
    NoNewEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Event(EventRecord),
    /// Nothing was ever written to the partition; no reader was opened
    PartitionEmpty,
    /// Nothing arrived within the wait window, or the first event had no body
    NoNewEvent,
}

impl Received {
    pub fn outcome(&self) -> ReceiveOutcome {
        match self {
            Received::Event(_) => ReceiveOutcome::Event,
            Received::PartitionEmpty => ReceiveOutcome::PartitionEmpty,
            Received::NoNewEvent => ReceiveOutcome::NoNewEvent,
        }
    }

    /// The received record, or the default-valued sentinel.
    pub fn into_record(self) -> EventRecord {
        match self {
            Received::Event(record) => record,
            Received::PartitionEmpty | Received::NoNewEvent => EventRecord::default(),
        }
    }
}

/// Receiving side of the facade.
#[automock]
#[async_trait]
pub trait ReceiveEvents: Send + Sync {
    async fn receive_latest(&self) -> HubResult<Received>;
}

/// Clients opened for one receive call.
#[derive(Default)]
struct ConsumerSession {
    probe: Option<Box<dyn PartitionProbe>>,
    reader: Option<Box<dyn PartitionReader>>,
}

impl ConsumerSession {
    fn probe(&self) -> HubResult<&dyn PartitionProbe> {
        self.probe
            .as_deref()
            .ok_or_else(|| HubError::Receive(TransportError::Closed))
    }

    fn reader(&mut self) -> HubResult<&mut (dyn PartitionReader + 'static)> {
        self.reader
            .as_deref_mut()
            .ok_or_else(|| HubError::Receive(TransportError::Closed))
    }

    async fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close().await;
        }
        if let Some(mut probe) = self.probe.take() {
            probe.close().await;
        }
    }
}

impl Drop for ConsumerSession {
    // Reached with clients still open only when the receive future is
    // dropped mid-flight, e.g. on client disconnect.
    fn drop(&mut self) {
        let reader = self.reader.take();
        let probe = self.probe.take();
        if reader.is_none() && probe.is_none() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(mut reader) = reader {
                        reader.close().await;
                    }
                    if let Some(mut probe) = probe {
                        probe.close().await;
                    }
                });
            }
            Err(_) => warn!("consumer session dropped outside a runtime; clients not closed"),
        }
    }
}

enum Phase {
    Init,
    ProbeEmpty,
    OpenReader,
    Pull,
    Decode(Vec<ReceivedEvent>),
    Done(Received),
}

/// Reads the most recent event published to one partition.
pub struct EventReceiver {
    connector: Arc<dyn BusConnector>,
    config: BusConnectionConfig,
    options: ReceiverOptions,
}

impl EventReceiver {
    pub fn new(
        connector: Arc<dyn BusConnector>,
        config: BusConnectionConfig,
        options: ReceiverOptions,
    ) -> Self {
        Self {
            connector,
            config,
            options,
        }
    }

    #[instrument(
        level = "debug",
        skip(self),
        fields(hub = %self.config.hub_name, partition = %self.config.partition_id),
        err(level = "warn")
    )]
    pub async fn receive_latest(&self) -> HubResult<Received> {
        let mut session = ConsumerSession::default();
        let result = self.run(&mut session).await;
        session.close().await;
        if let Ok(received) = &result {
            debug!("receive finished: {}", received.outcome());
        }
        result
    }

    async fn run(&self, session: &mut ConsumerSession) -> HubResult<Received> {
        let partition_id = self.config.partition_id.as_str();
        let mut phase = Phase::Init;

        loop {
            phase = match phase {
                Phase::Init => {
                    let probe = self
                        .connector
                        .connect_probe(&self.config, &self.options.consumer_group)
                        .instrument(info_span!("Create EventHub Consumer Client"))
                        .await
                        .map_err(HubError::Connectivity)?;
                    session.probe = Some(probe);
                    Phase::ProbeEmpty
                }
                Phase::ProbeEmpty => {
                    let properties = session
                        .probe()?
                        .partition_properties(partition_id)
                        .await
                        .map_err(HubError::Receive)?;
                    if properties.is_empty {
                        Phase::Done(Received::PartitionEmpty)
                    } else {
                        Phase::OpenReader
                    }
                }
                Phase::OpenReader => {
                    let options = ReaderOptions {
                        owner_level: Some(self.options.owner_level),
                    };
                    let reader = self
                        .connector
                        .open_reader(
                            &self.config,
                            &self.options.consumer_group,
                            partition_id,
                            EventPosition::Latest,
                            &options,
                        )
                        .instrument(info_span!("Open EventHub Partition Reader"))
                        .await
                        .map_err(HubError::Receive)?;
                    session.reader = Some(reader);
                    Phase::Pull
                }
                Phase::Pull => {
                    let cancel = CancellationToken::new();
                    let _cancel_on_exit = cancel.clone().drop_guard();
                    let events = session
                        .reader()?
                        .receive_batch(self.options.max_batch_size, self.options.max_wait, &cancel)
                        .instrument(info_span!("Receive with EventHub Consumer Client"))
                        .await
                        .map_err(HubError::Receive)?;
                    Phase::Decode(events)
                }
                Phase::Decode(events) => {
                    if events.len() > 1 {
                        debug!("discarding {} events after the first", events.len() - 1);
                    }
                    match events.first().and_then(ReceivedEvent::body) {
                        Some(body) if !body.is_empty() => {
                            Phase::Done(Received::Event(codec::decode(body)?))
                        }
                        _ => Phase::Done(Received::NoNewEvent),
                    }
                }
                Phase::Done(received) => return Ok(received),
            };
        }
    }
}

#[async_trait]
impl ReceiveEvents for EventReceiver {
    async fn receive_latest(&self) -> HubResult<Received> {
        EventReceiver::receive_latest(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BatchOptions, EventData, InMemoryEventHub};
    use crate::codec::CodecError;
    use crate::config::RetryPolicy;
    use std::time::Duration;

    fn config() -> BusConnectionConfig {
        BusConnectionConfig::new("Endpoint=memory://local", "h1", "0")
    }

    fn receiver(hub: &InMemoryEventHub, max_wait: Duration) -> EventReceiver {
        EventReceiver::new(
            Arc::new(hub.clone()),
            config(),
            ReceiverOptions {
                max_wait,
                ..ReceiverOptions::default()
            },
        )
    }

    async fn publish_raw(hub: &InMemoryEventHub, events: Vec<EventData>) {
        let producer = hub
            .connect_producer(&config(), &RetryPolicy::default())
            .await
            .unwrap();
        let mut batch = producer
            .create_batch(BatchOptions::for_partition("0"))
            .await
            .unwrap();
        for event in events {
            assert!(batch.try_add(event));
        }
        producer.send_batch(&batch).await.unwrap();
    }

    /// Publishes once the receiver has had time to attach at "latest".
    fn publish_later(hub: &InMemoryEventHub, events: Vec<EventData>) {
        let hub = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            publish_raw(&hub, events).await;
        });
    }

    #[test]
    fn test_outcome_names() {
        assert_eq!(ReceiveOutcome::PartitionEmpty.as_ref(), "partition-empty");
        assert_eq!(ReceiveOutcome::NoNewEvent.to_string(), "no-new-event");
        assert_eq!(ReceiveOutcome::Event.as_ref(), "event");
    }

    #[test]
    fn test_no_data_outcomes_collapse_to_sentinel() {
        assert_eq!(Received::PartitionEmpty.into_record(), EventRecord::default());
        assert_eq!(Received::NoNewEvent.into_record(), EventRecord::default());
        let record = EventRecord::new("e1", 1);
        assert_eq!(Received::Event(record.clone()).into_record(), record);
    }

    #[tokio::test]
    async fn test_empty_partition_skips_reader() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);

        let received = receiver(&hub, Duration::from_secs(1))
            .receive_latest()
            .await
            .unwrap();
        assert_eq!(received, Received::PartitionEmpty);

        let stats = hub.stats();
        assert_eq!(stats.readers_opened, 0);
        assert_eq!(stats.probes_opened, 1);
        assert_eq!(stats.probes_closed, 1);
    }

    #[tokio::test]
    async fn test_timeout_returns_no_new_event() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);
        publish_raw(&hub, vec![EventData::new(br#"{"id":"old"}"#.to_vec())]).await;

        let received = receiver(&hub, Duration::from_millis(50))
            .receive_latest()
            .await
            .unwrap();
        assert_eq!(received, Received::NoNewEvent);

        let stats = hub.stats();
        assert_eq!(stats.readers_opened, 1);
        assert_eq!(stats.readers_closed, 1);
        assert_eq!(stats.probes_closed, 1);
    }

    #[tokio::test]
    async fn test_receive_phases_are_traced() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);
        publish_raw(&hub, vec![EventData::new(br#"{"id":"old"}"#.to_vec())]).await;
        let (captured, _guard) = crate::test_support::capture();

        receiver(&hub, Duration::from_millis(20))
            .receive_latest()
            .await
            .unwrap();

        let spans = captured.spans.lock().unwrap().clone();
        assert_eq!(
            spans,
            vec![
                "receive_latest",
                "Create EventHub Consumer Client",
                "Open EventHub Partition Reader",
                "Receive with EventHub Consumer Client",
            ]
        );
    }

    #[tokio::test]
    async fn test_receives_event_published_after_attach() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);
        publish_raw(&hub, vec![EventData::new(br#"{"id":"old"}"#.to_vec())]).await;

        publish_later(
            &hub,
            vec![EventData::new(br#"{"id":"e1","value":42}"#.to_vec())],
        );
        let received = receiver(&hub, Duration::from_secs(5))
            .receive_latest()
            .await
            .unwrap();
        assert_eq!(received, Received::Event(EventRecord::new("e1", 42)));
    }

    #[tokio::test]
    async fn test_only_first_event_is_consumed() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);
        publish_raw(&hub, vec![EventData::new(b"{}".to_vec())]).await;

        publish_later(
            &hub,
            vec![
                EventData::new(br#"{"id":"first"}"#.to_vec()),
                EventData::new(br#"{"id":"second"}"#.to_vec()),
            ],
        );
        let receiver = EventReceiver::new(
            Arc::new(hub.clone()),
            config(),
            ReceiverOptions {
                max_batch_size: 5,
                max_wait: Duration::from_secs(5),
                ..ReceiverOptions::default()
            },
        );
        let received = receiver.receive_latest().await.unwrap();
        assert_eq!(received.into_record().id.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_event_without_body_is_no_new_event() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);
        publish_raw(&hub, vec![EventData::new(b"{}".to_vec())]).await;

        publish_later(&hub, vec![EventData::empty()]);
        let received = receiver(&hub, Duration::from_secs(5))
            .receive_latest()
            .await
            .unwrap();
        assert_eq!(received, Received::NoNewEvent);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_an_error_and_releases_clients() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);
        publish_raw(&hub, vec![EventData::new(b"{}".to_vec())]).await;

        publish_later(&hub, vec![EventData::new(b"{broken".to_vec())]);
        let result = receiver(&hub, Duration::from_secs(5))
            .receive_latest()
            .await;
        assert!(matches!(
            result,
            Err(HubError::Serialization(CodecError::Decode(_)))
        ));

        let stats = hub.stats();
        assert_eq!(stats.readers_closed, 1);
        assert_eq!(stats.probes_closed, 1);
    }

    #[tokio::test]
    async fn test_missing_partition_is_receive_error() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);
        let receiver = EventReceiver::new(
            Arc::new(hub.clone()),
            BusConnectionConfig::new("Endpoint=memory://local", "h1", "3"),
            ReceiverOptions::default(),
        );

        let result = receiver.receive_latest().await;
        assert!(matches!(
            result,
            Err(HubError::Receive(TransportError::PartitionNotFound { .. }))
        ));
        assert_eq!(hub.stats().probes_closed, 1);
    }

    #[tokio::test]
    async fn test_unreachable_hub_is_connectivity_error() {
        let hub = InMemoryEventHub::new();
        let result = receiver(&hub, Duration::from_secs(1)).receive_latest().await;
        assert!(matches!(
            result,
            Err(HubError::Connectivity(TransportError::HubNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_dropped_receive_still_releases_clients() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);
        publish_raw(&hub, vec![EventData::new(b"{}".to_vec())]).await;

        let receiver = receiver(&hub, Duration::from_secs(30));
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), receiver.receive_latest()).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = hub.stats();
        assert_eq!(stats.readers_opened, 1);
        assert_eq!(stats.readers_closed, 1);
        assert_eq!(stats.probes_closed, 1);
    }

    #[tokio::test]
    async fn test_concurrent_receive_preempts_earlier_reader() {
        let hub = InMemoryEventHub::new();
        hub.create_hub("h1", 1);
        publish_raw(&hub, vec![EventData::new(b"{}".to_vec())]).await;

        let first = Arc::new(receiver(&hub, Duration::from_secs(5)));
        let early = {
            let first = first.clone();
            tokio::spawn(async move { first.receive_latest().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let late = receiver(&hub, Duration::from_millis(50))
            .receive_latest()
            .await
            .unwrap();
        assert_eq!(late, Received::NoNewEvent);

        let early = early.await.unwrap();
        assert!(matches!(
            early,
            Err(HubError::Receive(TransportError::OwnershipLost { .. }))
        ));
    }
}
