//! Redfish management server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──TLS──▶ net::acceptor ──▶ http::server ──▶ http::event_loop ──▶ routing ──▶ redfish
//!                     (cert → identity)  (auth, limits)   (N local loops)                  │
//!                                                                                        ▼
//!     Client ◀─────────────────────────── http::response ◀── AsyncResp (last share) ◀────┘
//!                                                                    │
//!                                                          client::HttpClient ──▶ satellites
//! ```

use std::path::PathBuf;

use clap::Parser;

use redfish_server::config::{load_config, validation::validate_config, ServerConfig};
use redfish_server::http::{bind, HttpServer};
use redfish_server::lifecycle::{spawn_signal_handler, Shutdown};
use redfish_server::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "redfish-server")]
#[command(about = "Redfish management web server", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {error}");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "redfish-server starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        event_loops = config.event_loops.workers,
        tls = config.tls.is_some(),
        auth = config.auth.enabled,
        satellites = config.aggregation.satellites.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (listener, local_addr) = bind(&config.listener.bind_address).await?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
