use clap::Parser;
use hubgate_core::{HubError, HubResult, HubgateConfig};
use hubgate_http::ServerConfig;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::observability::DEFAULT_OTLP_ENDPOINT;

/// Hubgate HTTP facade for one event hub partition
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Host address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,

    /// Log level (error, warn, info, debug, trace), used when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Event hub name
    #[arg(long, env = "EVENTHUBS_NAME")]
    pub hub_name: Option<String>,

    /// Connection string for the namespace
    #[arg(long, env = "EVENTHUBS_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Partition every request is pinned to
    #[arg(long, env = "EVENTHUBS_PARTITION")]
    pub partition: Option<String>,

    /// Number of partitions created for the in-process hub
    #[arg(long, default_value_t = 4)]
    pub partition_count: usize,

    /// OTLP/gRPC collector that receives exported spans
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", default_value = DEFAULT_OTLP_ENDPOINT)]
    pub otlp_endpoint: String,

    /// Keep traces on the console only
    #[arg(long)]
    pub no_otlp: bool,
}

impl Cli {
    /// Reads the config file when present, then applies command line and
    /// environment overrides and validates the result.
    pub fn load_config(&self) -> HubResult<HubgateConfig> {
        let config = if self.config.exists() {
            HubgateConfig::from_file(&self.config)?
        } else {
            info!(
                "config file {} not found, using defaults",
                self.config.display()
            );
            HubgateConfig::default()
        };

        let config = config.with_overrides(
            self.hub_name.clone(),
            self.connection_string.clone(),
            self.partition.clone(),
        );
        config.validate()?;
        self.check_partition(&config.event_hubs.partition_id)?;

        debug!(
            hub = %config.event_hubs.hub_name,
            partition = %config.event_hubs.partition_id,
            "config loaded"
        );
        Ok(config)
    }

    /// The in-process hub numbers its partitions "0".."partition_count-1".
    fn check_partition(&self, partition_id: &str) -> HubResult<()> {
        if (0..self.partition_count).any(|index| index.to_string() == partition_id) {
            return Ok(());
        }
        Err(HubError::configuration(format!(
            "EventHubs:Partition '{}' is not one of the {} partitions of the hub",
            partition_id, self.partition_count
        )))
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        (!self.no_otlp).then_some(self.otlp_endpoint.as_str())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// `RUST_LOG` wins over `--log-level`.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}
