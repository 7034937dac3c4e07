//! Terraform Provider for Grafana
//!
//! Started by Terraform as a plugin; all logging goes to stderr since stdout
//! carries the plugin handshake.

use grafana_provider::{serve, GrafanaProvider};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("Starting Grafana Terraform Provider {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = serve(GrafanaProvider::new()).await {
        error!("{:#}", e);
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
