//! Error handling for hubgate-http
//!
//! Maps core failures onto HTTP status codes. A malformed event read back
//! from the bus is an upstream problem (502), while a payload that cannot be
//! encoded on the way in is the caller's (400).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hubgate_core::HubError;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Send(#[source] HubError),

    #[error("{0}")]
    Receive(#[source] HubError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Send(HubError::Serialization(_)) => StatusCode::BAD_REQUEST,
            Self::Receive(HubError::Serialization(_)) => StatusCode::BAD_GATEWAY,
            Self::Send(err) | Self::Receive(err) => match err {
                HubError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                HubError::Connectivity(_) | HubError::Publish { .. } | HubError::Receive(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl PartialEq<StatusCode> for AppError {
    fn eq(&self, status_code: &StatusCode) -> bool {
        &self.status() == status_code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed with {}: {}", status, self);
        } else {
            warn!("request rejected with {}: {}", status, self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
