//! Fastpath Gateway
//!
//! HTTP surface over the data plane:
//! - Memory pool statistics and readiness
//! - NUMA topology and XDP capability reports
//! - A packet forward endpoint exercising acquire/release per request
//! - Prometheus exposition

pub mod config;
pub mod handlers;
pub mod middleware;

pub use config::GatewayConfig;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use fastpath_common::FastpathResult;
use fastpath_dataplane::{numa_info, telemetry, ForwardPath, MemoryPool, NumaInfo, Pipeline, PoolStats};
use fastpath_xdp::{current_memlock_limit, set_rlimit_memlock, XdpCapability, XdpStatus};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::ServiceBuilder;

/// Application state shared across handlers
pub struct AppState {
    /// Pool + forwarding pipeline
    pub forward: ForwardPath,
    /// Topology snapshot taken at startup
    pub numa: NumaInfo,
    /// XDP report taken at startup
    pub xdp: XdpStatus,
    /// Renders `/metrics` when a recorder is installed
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        pool: Arc<MemoryPool>,
        numa: NumaInfo,
        xdp: XdpStatus,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            forward: ForwardPath::new(pool, Pipeline::forwarding()),
            numa,
            xdp,
            prometheus,
        }
    }

    pub fn pool(&self) -> &MemoryPool {
        self.forward.pool()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool().stats()
    }
}

/// Build the API router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))

        // Metrics
        .route("/metrics", get(handlers::metrics))

        // Data plane API
        .route("/api/v1/pool/stats", get(handlers::pool_stats))
        .route("/api/v1/numa", get(handlers::numa))
        .route("/api/v1/xdp", get(handlers::xdp))
        .route("/api/v1/packet/forward", post(handlers::packet_forward))
        .route("/api/v1/packet/stats", get(handlers::packet_stats))

        .route_layer(axum::middleware::from_fn(middleware::logging))
        .layer(ServiceBuilder::new().layer(Extension(state)))
}

/// Bring up the data plane and serve until Ctrl-C
///
/// Order: memlock raise, XDP probe, NUMA probe, pool, HTTP. The pool is
/// closed after the server has drained.
pub async fn run(config: GatewayConfig, prometheus: Option<PrometheusHandle>) -> FastpathResult<()> {
    telemetry::describe();

    let memlock = match set_rlimit_memlock() {
        Ok(limit) => Some(limit),
        Err(e) => {
            tracing::warn!(error = %e, "could not raise RLIMIT_MEMLOCK, kernel bypass may fail");
            current_memlock_limit().ok()
        }
    };

    let xdp = XdpStatus::new(config.xdp.clone(), XdpCapability::probe(), memlock);
    xdp.log();

    let numa = numa_info();
    if numa.available {
        tracing::info!(
            nodes = numa.node_count,
            current_node = numa.current_node,
            memory_mb = numa.total_memory_mb(),
            "NUMA topology detected"
        );
    } else {
        tracing::info!("NUMA topology not available, using default memory placement");
    }
    telemetry::publish_numa_info(&numa);

    let pool = Arc::new(MemoryPool::new(config.pool_config(&numa))?);
    telemetry::publish_pool_stats(&pool.stats());

    let state = Arc::new(AppState::new(pool, numa, xdp, prometheus));
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Fastpath Gateway listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped, releasing memory pool");
    shutdown(state)
}

fn shutdown(state: Arc<AppState>) -> FastpathResult<()> {
    let Ok(state) = Arc::try_unwrap(state) else {
        tracing::warn!("state still shared at shutdown, leaving pool to process exit");
        return Ok(());
    };
    match Arc::try_unwrap(state.forward.into_pool()) {
        Ok(pool) => Ok(pool.close()?),
        Err(_) => {
            tracing::warn!("pool still shared at shutdown, leaving it to process exit");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
