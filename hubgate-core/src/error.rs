use thiserror::Error;

use crate::codec::CodecError;

/// Failures reported by a bus transport.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Hub not found: {hub_name}")]
    HubNotFound { hub_name: String },

    #[error("Partition {partition_id} not found in hub {hub_name}")]
    PartitionNotFound {
        hub_name: String,
        partition_id: String,
    },

    #[error("Service busy: {0}")]
    ServiceBusy(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Reader ownership denied on partition {partition_id}: owner level {current} > {requested}")]
    OwnershipDenied {
        partition_id: String,
        current: i64,
        requested: i64,
    },

    #[error("Reader ownership lost on partition {partition_id}")]
    OwnershipLost { partition_id: String },

    #[error("Client is closed")]
    Closed,
}

impl TransportError {
    /// Whether a retry of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServiceBusy(_) | Self::ConnectionLost(_) | Self::Timeout { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Connectivity error: {0}")]
    Connectivity(#[source] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] CodecError),

    #[error("Event of {size} bytes exceeds the batch limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Publish failed after {attempts} attempt(s): {source}")]
    Publish {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Receive failed: {0}")]
    Receive(#[source] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Producer client is closed")]
    Closed,
}

pub type HubResult<T> = Result<T, HubError>;

impl HubError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        HubError::Configuration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::ServiceBusy("throttled".into()).is_transient());
        assert!(TransportError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(TransportError::ConnectionLost("reset".into()).is_transient());
        assert!(!TransportError::Closed.is_transient());
        assert!(
            !TransportError::OwnershipLost {
                partition_id: "0".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_publish_error_message() {
        let err = HubError::Publish {
            attempts: 4,
            source: TransportError::ServiceBusy("throttled".into()),
        };
        assert_eq!(
            err.to_string(),
            "Publish failed after 4 attempt(s): Service busy: throttled"
        );
    }
}
