use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{HubError, HubResult, TransportError};

pub const DEFAULT_CONSUMER_GROUP: &str = "$Default";

/// Top-level service configuration, as read from `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubgateConfig {
    #[serde(rename = "EventHubs", default)]
    pub event_hubs: BusConnectionConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub receiver: ReceiverOptions,
}

impl HubgateConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> HubResult<Self> {
        from_file(path)
    }

    /// Replaces the connection settings with any values given explicitly,
    /// e.g. from the command line or the environment.
    pub fn with_overrides(
        mut self,
        hub_name: Option<String>,
        connection_string: Option<String>,
        partition_id: Option<String>,
    ) -> Self {
        if let Some(hub_name) = hub_name {
            self.event_hubs.hub_name = hub_name;
        }
        if let Some(connection_string) = connection_string {
            self.event_hubs.connection_string = SecretString::from(connection_string);
        }
        if let Some(partition_id) = partition_id {
            self.event_hubs.partition_id = partition_id;
        }
        self
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.event_hubs.hub_name.trim().is_empty() {
            return Err(HubError::configuration("EventHubs:Name is not set"));
        }
        if self.event_hubs.partition_id.trim().is_empty() {
            return Err(HubError::configuration("EventHubs:Partition is not set"));
        }
        if self.event_hubs.connection_string.expose_secret().is_empty() {
            return Err(HubError::configuration(
                "EventHubs:ConnectionString is not set",
            ));
        }
        if self.receiver.max_batch_size == 0 {
            return Err(HubError::configuration(
                "receiver.max_batch_size must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Where the bus lives and which partition this service talks to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusConnectionConfig {
    #[serde(rename = "ConnectionString", deserialize_with = "secret_string")]
    pub connection_string: SecretString,

    #[serde(rename = "Name")]
    pub hub_name: String,

    #[serde(rename = "Partition")]
    pub partition_id: String,
}

impl BusConnectionConfig {
    pub fn new(
        connection_string: impl Into<String>,
        hub_name: impl Into<String>,
        partition_id: impl Into<String>,
    ) -> Self {
        Self {
            connection_string: SecretString::from(connection_string.into()),
            hub_name: hub_name.into(),
            partition_id: partition_id.into(),
        }
    }

    pub fn connection_properties(&self) -> Result<ConnectionProperties, TransportError> {
        let properties = ConnectionProperties::parse(self.connection_string.expose_secret())?;
        if let Some(entity_path) = &properties.entity_path {
            if entity_path != &self.hub_name {
                return Err(TransportError::InvalidConnectionString(format!(
                    "EntityPath '{}' does not match hub name '{}'",
                    entity_path, self.hub_name
                )));
            }
        }
        Ok(properties)
    }
}

fn secret_string<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Parsed form of `Endpoint=sb://host/;SharedAccessKeyName=..;SharedAccessKey=..;EntityPath=..`
#[derive(Debug, Clone)]
pub struct ConnectionProperties {
    pub scheme: String,
    pub host: String,
    pub shared_access_key_name: Option<String>,
    pub shared_access_key: Option<SecretString>,
    pub shared_access_signature: Option<SecretString>,
    pub entity_path: Option<String>,
}

impl ConnectionProperties {
    pub fn parse(connection_string: &str) -> Result<Self, TransportError> {
        let invalid = |msg: &str| TransportError::InvalidConnectionString(msg.to_string());

        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut signature = None;
        let mut entity_path = None;

        for part in connection_string.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| invalid("expected key=value pairs"))?;
            let value = value.trim().to_string();
            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value),
                "sharedaccesskeyname" => key_name = Some(value),
                "sharedaccesskey" => key = Some(SecretString::from(value)),
                "sharedaccesssignature" => signature = Some(SecretString::from(value)),
                "entitypath" => entity_path = Some(value),
                // other tokens (e.g. UseDevelopmentEmulator) are accepted and ignored
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or_else(|| invalid("missing Endpoint"))?;
        let (scheme, rest) = endpoint
            .split_once("://")
            .ok_or_else(|| invalid("Endpoint must be an absolute URI"))?;
        let host = rest.trim_end_matches('/').to_string();
        if scheme.is_empty() || host.is_empty() {
            return Err(invalid("Endpoint must name a host"));
        }

        let scheme = scheme.to_ascii_lowercase();
        if scheme != "memory" && signature.is_none() && (key_name.is_none() || key.is_none()) {
            return Err(invalid(
                "SharedAccessKeyName and SharedAccessKey, or SharedAccessSignature, are required",
            ));
        }

        Ok(Self {
            scheme,
            host,
            shared_access_key_name: key_name,
            shared_access_key: key,
            shared_access_signature: signature,
            entity_path: entity_path.filter(|path| !path.is_empty()),
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.scheme == "memory"
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RetryMode {
    #[default]
    Fixed,
    Exponential,
}

/// Retry settings applied to producer operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt
    #[serde(default = "default_try_timeout", with = "duration_ms")]
    pub try_timeout: Duration,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub mode: RetryMode,

    /// Fixed delay between attempts, or the base delay in exponential mode
    #[serde(default = "default_retry_delay", with = "duration_ms")]
    pub delay: Duration,

    #[serde(default = "default_max_retry_delay", with = "duration_ms")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            try_timeout: default_try_timeout(),
            max_retries: default_max_retries(),
            mode: RetryMode::default(),
            delay: default_retry_delay(),
            max_delay: default_max_retry_delay(),
        }
    }
}

/// Settings for the single-shot "latest event" read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverOptions {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_max_wait", with = "duration_ms")]
    pub max_wait: Duration,

    /// 0 forcibly takes the partition from readers of equal or lower level
    #[serde(default)]
    pub owner_level: i64,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_wait: default_max_wait(),
            owner_level: 0,
            consumer_group: default_consumer_group(),
        }
    }
}

fn default_try_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(800)
}

fn default_max_retry_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_max_batch_size() -> usize {
    1
}

fn default_max_wait() -> Duration {
    Duration::from_secs(1)
}

fn default_consumer_group() -> String {
    DEFAULT_CONSUMER_GROUP.to_string()
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> HubResult<T> {
    let file = File::open(path)
        .map_err(|e| HubError::Configuration(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| HubError::Configuration(format!("Failed to parse config file: {}", e)))
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> HubResult<T> {
    serde_json::from_str(s)
        .map_err(|e| HubError::Configuration(format!("Failed to parse config: {}", e)))
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
