//! Tracing setup for the binary.
//!
//! Spans are written to the console and, best-effort, exported over OTLP/gRPC.
//! If the exporter cannot be installed the service keeps running with console
//! output only.

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace as sdktrace;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// Installs the global subscriber. Must run inside a tokio runtime, since the
/// batch span processor is driven by it.
pub fn init_tracing(filter: EnvFilter, otlp_endpoint: Option<&str>) {
    global::set_text_map_propagator(opentelemetry_sdk::propagation::TraceContextPropagator::new());

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    let provider = otlp_endpoint.and_then(build_tracer_provider);
    match provider {
        Some(provider) => {
            let tracer = provider.tracer(SERVICE_NAME);
            global::set_tracer_provider(provider);
            registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init();
        }
        None => {
            registry.init();
            if let Some(endpoint) = otlp_endpoint {
                warn!("OTLP exporter for {} unavailable, console only", endpoint);
            }
        }
    }
}

/// Flushes pending spans. Call once before exit.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}

fn build_tracer_provider(endpoint: &str) -> Option<sdktrace::TracerProvider> {
    let resource = Resource::new(resource_attributes(SERVICE_NAME, env!("CARGO_PKG_VERSION")));
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(sdktrace::Config::default().with_resource(resource))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .ok()
}

fn resource_attributes(service_name: &str, service_version: &str) -> Vec<KeyValue> {
    let mut attrs = vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", service_version.to_string()),
    ];
    if let Ok(value) = std::env::var("HOSTNAME") {
        attrs.push(KeyValue::new("service.instance.id", value));
    }
    attrs
}
