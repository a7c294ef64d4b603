use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::event_hub::{get_latest_event, send_event};
use crate::server::AppState;

/// Create the EventHub routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/GetLatestEvent", get(get_latest_event))
        .route("/SendEvent", post(send_event))
}
