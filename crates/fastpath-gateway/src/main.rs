//! Fastpath Gateway - Main Entry Point

use anyhow::Context;
use fastpath_gateway::GatewayConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Fastpath Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::from_env().context("invalid FASTPATH_* configuration")?;

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed, /metrics disabled");
            None
        }
    };

    fastpath_gateway::run(config, prometheus).await?;
    Ok(())
}
