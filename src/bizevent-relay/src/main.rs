//! BizEvent Relay: local relay endpoint forwarding storefront business
//! events to the analytics backend.
//!
//! Main entry point that loads configuration, resolves the relay target and
//! starts the server.

use bizevent_api::{RelayServer, RemoteForwarder};
use bizevent_core::config::AppConfig;
use bizevent_core::TransportKind;
use bizevent_transport::TransportConfig;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "bizevent-relay")]
#[command(about = "Local relay forwarding storefront business events to the analytics backend")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "BIZEVENT__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "BIZEVENT__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Relay endpoint URL (overrides config)
    #[arg(long, env = "BIZEVENT__RELAY__URL")]
    relay_url: Option<String>,

    /// Event transport: async_socket, subprocess or sync_http (overrides config)
    #[arg(long, env = "BIZEVENT__CAPTURE__TRANSPORT")]
    transport: Option<TransportKind>,

    /// Send events to the test server and log at debug level
    #[arg(long, default_value_t = false)]
    test_mode: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(url) = cli.relay_url {
        config.relay.url = url;
    }
    if let Some(transport) = cli.transport {
        config.capture.transport = transport;
    }
    if cli.test_mode {
        config.capture.test_mode = true;
    }

    // Initialize tracing
    let default_filter = if config.capture.test_mode {
        "bizevent=debug,tower_http=debug"
    } else {
        "bizevent=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .json()
        .init();

    info!("BizEvent relay starting up");

    info!(
        node_id = %config.node_id,
        enabled = config.capture.enabled,
        test_mode = config.capture.test_mode,
        transport = %config.capture.transport,
        http_port = config.api.http_port,
        relay_url = %config.relay.url,
        "Configuration loaded"
    );

    // Resolve the relay target once for the whole process
    let target = Arc::new(TransportConfig::resolve(&config.relay)?);

    // Validate the configured strategy up front
    bizevent_transport::from_config(&config, target.clone())?;

    let forwarder = Arc::new(RemoteForwarder::from_config(&config)?);
    let server = RelayServer::new(config.clone(), forwarder, &target);

    // Start metrics exporter
    if let Err(e) = server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!(path = server.relay_path(), "BizEvent relay is ready");

    // Start HTTP server (blocks until shutdown)
    server.start_http().await?;

    Ok(())
}
