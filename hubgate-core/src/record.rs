use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Application payload exchanged over HTTP and carried as a bus message body.
///
/// The default value doubles as the empty sentinel returned when no event
/// is available: `{"id":null,"value":0}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct EventRecord {
    /// Caller supplied event identifier
    pub id: Option<String>,

    /// Event value
    pub value: i64,

    /// Free-form string attributes, omitted from the encoding when empty
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl EventRecord {
    pub fn new(id: impl Into<String>, value: i64) -> Self {
        Self {
            id: Some(id.into()),
            value,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// True for the default-valued sentinel.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
