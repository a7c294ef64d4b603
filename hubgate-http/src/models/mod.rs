use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use hubgate_core::EventRecord;

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
