use std::collections::BTreeMap;

/// A single message body plus application properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventData {
    body: Option<Vec<u8>>,
    pub properties: BTreeMap<String, String>,
}

impl EventData {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: Some(body.into()),
            properties: BTreeMap::new(),
        }
    }

    /// An event that carries no body at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn size_in_bytes(&self) -> usize {
        let body = self.body.as_ref().map_or(0, Vec::len);
        let properties: usize = self
            .properties
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum();
        body + properties
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Pins every event of the batch to this partition
    pub partition_id: Option<String>,
    /// Lower than the transport's limit only; larger values are clamped
    pub max_size_in_bytes: Option<usize>,
}

impl BatchOptions {
    pub fn for_partition(partition_id: impl Into<String>) -> Self {
        Self {
            partition_id: Some(partition_id.into()),
            max_size_in_bytes: None,
        }
    }
}

/// Size-bounded set of events published together in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDataBatch {
    partition_id: Option<String>,
    max_size_in_bytes: usize,
    size_in_bytes: usize,
    events: Vec<EventData>,
}

impl EventDataBatch {
    pub fn new(partition_id: Option<String>, max_size_in_bytes: usize) -> Self {
        Self {
            partition_id,
            max_size_in_bytes,
            size_in_bytes: 0,
            events: Vec::new(),
        }
    }

    /// Adds the event if it fits; the batch is left untouched otherwise.
    pub fn try_add(&mut self, event: EventData) -> bool {
        let size = event.size_in_bytes();
        if self.size_in_bytes + size > self.max_size_in_bytes {
            return false;
        }
        self.size_in_bytes += size;
        self.events.push(event);
        true
    }

    pub fn partition_id(&self) -> Option<&str> {
        self.partition_id.as_deref()
    }

    pub fn max_size_in_bytes(&self) -> usize {
        self.max_size_in_bytes
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[EventData] {
        &self.events
    }
}
