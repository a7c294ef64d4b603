pub mod event_hub;

use crate::handlers;
use crate::models::{ErrorResponse, EventRecord};
use crate::server::AppState;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::event_hub::get_latest_event, handlers::event_hub::send_event),
    components(schemas(EventRecord, ErrorResponse)),
    tags((name = "EventHub", description = "Publish to and read from the configured partition"))
)]
pub struct ApiDoc;

/// Create the main API router with state
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/EventHub", event_hub::routes())
}

/// Health check endpoint for container health monitoring
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
