//! # hubgate-core
//!
//! Send/receive protocol logic for a facade that publishes events to, and
//! reads the latest event from, one partition of a partitioned event hub.
//!
//! ## Components
//!
//! - [`record`]: the application payload, [`EventRecord`]
//! - [`codec`]: JSON-UTF8 encoding of message bodies
//! - [`config`]: connection settings, [`config::RetryPolicy`] and receiver options
//! - [`bus`]: the transport seam and the in-process [`bus::InMemoryEventHub`]
//! - [`producer`]: the shared, lazily connected publishing client
//! - [`sender`]: single-event publish to a pinned partition, with retries
//! - [`consumer`]: the per-call probe/reader session that fetches the latest event
//!
//! ## Data flow
//!
//! ```text
//! EventRecord ─► codec::encode ─► EventDataBatch ─► ProducerTransport ─► partition log
//! partition log ─► PartitionReader ─► codec::decode ─► EventRecord
//! ```

pub mod bus;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
pub mod producer;
pub mod record;
pub mod retry;
pub mod sender;

pub use config::{BusConnectionConfig, HubgateConfig, ReceiverOptions, RetryPolicy};
pub use consumer::{EventReceiver, ReceiveEvents, ReceiveOutcome, Received};
pub use error::*;
pub use producer::ProducerClientManager;
pub use record::EventRecord;
pub use sender::{EventSender, PublishEvents};
