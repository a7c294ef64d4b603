use clap::Parser;
use hubgate::cli::Cli;
use hubgate::observability::{init_tracing, shutdown_tracing};
use hubgate_core::bus::InMemoryEventHub;
use hubgate_http::{build_state, start_server};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.env_filter(), cli.otlp_endpoint());

    let config = cli.load_config()?;

    // The bus runs in-process; the configured hub is created up front.
    let bus = InMemoryEventHub::new();
    bus.create_hub(&config.event_hubs.hub_name, cli.partition_count);

    let (state, producer) = build_state(Arc::new(bus), &config);

    // Connect eagerly so a bad connection string fails at startup.
    producer.ensure_producer().await?;
    info!(
        hub = %config.event_hubs.hub_name,
        partition = %config.event_hubs.partition_id,
        "producer connected"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to wait for Ctrl+C: {}", e);
        }
        info!("Shutdown signal received");
    };

    let result = start_server(cli.server_config(), state, shutdown).await;
    producer.close().await;
    // Flushing blocks until the batch exporter drains.
    if let Err(e) = tokio::task::spawn_blocking(shutdown_tracing).await {
        warn!("Failed to flush traces: {}", e);
    }
    result
}
