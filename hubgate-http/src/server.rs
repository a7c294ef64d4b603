use hubgate_core::bus::BusConnector;
use hubgate_core::{
    EventReceiver, EventSender, HubgateConfig, ProducerClientManager, PublishEvents,
    ReceiveEvents,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes::create_api_router;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Shared handler state. Both services are safe to call concurrently.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<dyn PublishEvents>,
    pub receiver: Arc<dyn ReceiveEvents>,
}

impl AppState {
    pub fn new(publisher: Arc<dyn PublishEvents>, receiver: Arc<dyn ReceiveEvents>) -> Self {
        Self {
            publisher,
            receiver,
        }
    }
}

/// Wires the sender and receiver to `connector`.
///
/// The producer manager is returned alongside the state so the caller can
/// connect it eagerly and close it on shutdown.
pub fn build_state(
    connector: Arc<dyn BusConnector>,
    config: &HubgateConfig,
) -> (AppState, Arc<ProducerClientManager>) {
    let producer = Arc::new(ProducerClientManager::new(
        connector.clone(),
        config.event_hubs.clone(),
        config.retry.clone(),
    ));
    let sender = EventSender::new(producer.clone());
    let receiver = EventReceiver::new(
        connector,
        config.event_hubs.clone(),
        config.receiver.clone(),
    );
    (
        AppState::new(Arc::new(sender), Arc::new(receiver)),
        producer,
    )
}

/// Start the HTTP server and run until `shutdown` resolves
pub async fn start_server<F>(config: ServerConfig, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port).parse::<SocketAddr>()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}
