use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::debug;

use crate::error::AppError;
use crate::models::{ErrorResponse, EventRecord};
use crate::server::AppState;

/// Response header naming how a receive ended: `event`, `partition-empty`
/// or `no-new-event`. The body alone cannot tell the last two apart.
pub const RECEIVE_OUTCOME_HEADER: &str = "x-receive-outcome";

/// Get the latest event
///
/// Reads the first event published to the configured partition after the
/// call attaches, waiting up to the receiver's max wait. Returns the
/// default-valued record when nothing is available.
#[utoipa::path(
    get,
    path = "/api/EventHub/GetLatestEvent",
    responses(
        (status = 200, description = "Latest event, or the empty record", body = EventRecord),
        (status = 502, description = "Stored event could not be decoded", body = ErrorResponse),
        (status = 503, description = "Event hub unavailable", body = ErrorResponse)
    ),
    tag = "EventHub"
)]
#[axum::debug_handler]
pub async fn get_latest_event(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let received = state
        .receiver
        .receive_latest()
        .await
        .map_err(AppError::Receive)?;

    let outcome: &'static str = received.outcome().into();
    debug!("GetLatestEvent: {}", outcome);
    Ok(([(RECEIVE_OUTCOME_HEADER, outcome)], Json(received.into_record())))
}

/// Send an event
///
/// Publishes the record to the configured partition.
#[utoipa::path(
    post,
    path = "/api/EventHub/SendEvent",
    request_body = EventRecord,
    responses(
        (status = 200, description = "Event published"),
        (status = 413, description = "Event exceeds the batch size limit", body = ErrorResponse),
        (status = 503, description = "Event hub unavailable", body = ErrorResponse)
    ),
    tag = "EventHub"
)]
#[axum::debug_handler]
pub async fn send_event(
    State(state): State<AppState>,
    Json(record): Json<EventRecord>,
) -> Result<StatusCode, AppError> {
    state
        .publisher
        .publish(&record)
        .await
        .map_err(AppError::Send)?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubgate_core::consumer::MockReceiveEvents;
    use hubgate_core::sender::MockPublishEvents;
    use hubgate_core::{HubError, Received};
    use std::sync::Arc;

    fn state(publisher: MockPublishEvents, receiver: MockReceiveEvents) -> AppState {
        AppState::new(Arc::new(publisher), Arc::new(receiver))
    }

    #[tokio::test]
    async fn test_send_event_publishes_record() {
        let mut publisher = MockPublishEvents::new();
        publisher
            .expect_publish()
            .withf(|record| record.id.as_deref() == Some("e1") && record.value == 42)
            .times(1)
            .returning(|_| Ok(()));

        let status = send_event(
            State(state(publisher, MockReceiveEvents::new())),
            Json(EventRecord::new("e1", 42)),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_send_event_maps_payload_too_large() {
        let mut publisher = MockPublishEvents::new();
        publisher
            .expect_publish()
            .returning(|_| Err(HubError::PayloadTooLarge { size: 10, max: 1 }));

        let err = send_event(
            State(state(publisher, MockReceiveEvents::new())),
            Json(EventRecord::default()),
        )
        .await
        .unwrap_err();
        assert!(err == StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_get_latest_event_sets_outcome_header() {
        let mut receiver = MockReceiveEvents::new();
        receiver
            .expect_receive_latest()
            .times(1)
            .returning(|| Ok(Received::PartitionEmpty));

        let response = get_latest_event(State(state(MockPublishEvents::new(), receiver)))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[RECEIVE_OUTCOME_HEADER],
            "partition-empty"
        );
    }
}
