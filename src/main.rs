//! Security gate binary.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id → trace → timeout
//!                          │
//!                          ▼
//!              ┌───────────────────────────┐
//!              │       SECURITY GATE       │
//!              │  blocklist → threats →    │──── 403 / 429
//!              │  rate limit → sanitize    │
//!              └─────────────┬─────────────┘
//!                            ▼
//!              echo handler or upstream forward
//!                            │
//!     ◀──────────────────────┘  + defensive headers
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use security_gate::config::{load_config, watcher::ConfigWatcher, GateConfig};
use security_gate::lifecycle::Shutdown;
use security_gate::observability::{logging, metrics};
use security_gate::HttpServer;

#[derive(Parser)]
#[command(name = "security-gate")]
#[command(about = "Inbound HTTP security gate", long_about = None)]
struct Cli {
    /// TOML configuration file. Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("security-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit_max = config.rate_limit.max_requests,
        rate_limit_window_ms = config.rate_limit.window_ms,
        threat_rules = config.firewall.threat_rules.len(),
        upstream = ?config.upstream.as_ref().map(|u| u.address.as_str()),
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

    // Hot reload. The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    shutdown.wait_for_signal().await;
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
