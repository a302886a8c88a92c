//! API Handlers

use crate::AppState;
use axum::{
    body::Bytes,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use fastpath_common::metrics::HistogramSnapshot;
use fastpath_common::{FastpathError, PacketError, PoolError};
use fastpath_dataplane::{telemetry, ForwardOutcome, NumaInfo, PathStatsSnapshot, PoolStats};
use fastpath_xdp::XdpStatus;
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub free_slots: usize,
}

/// Readiness check: at least one slot must be free
pub async fn ready(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.pool_stats();
    let ready = stats.free_slots > 0;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            free_slots: stats.free_slots,
        }),
    )
}

/// Prometheus exposition
pub async fn metrics(Extension(state): Extension<Arc<AppState>>) -> Response {
    let Some(handle) = state.prometheus.as_ref() else {
        return (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response();
    };

    telemetry::publish_pool_stats(&state.pool_stats());

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}

// === Data plane ===

pub async fn pool_stats(Extension(state): Extension<Arc<AppState>>) -> Json<PoolStats> {
    let stats = state.pool_stats();
    telemetry::publish_pool_stats(&stats);
    Json(stats)
}

pub async fn numa(Extension(state): Extension<Arc<AppState>>) -> Json<NumaInfo> {
    Json(state.numa.clone())
}

pub async fn xdp(Extension(state): Extension<Arc<AppState>>) -> Json<XdpStatus> {
    Json(state.xdp.clone())
}

/// Forward the request body as a raw frame; an empty body only cycles a slot
pub async fn packet_forward(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ForwardOutcome>, ApiError> {
    let frame = (!body.is_empty()).then_some(&body[..]);
    let outcome = state.forward.forward(frame)?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct PathStatsResponse {
    pub counters: PathStatsSnapshot,
    pub drop_rate: f64,
    pub latency_us: HistogramSnapshot,
}

pub async fn packet_stats(Extension(state): Extension<Arc<AppState>>) -> Json<PathStatsResponse> {
    let counters = state.forward.stats();
    Json(PathStatsResponse {
        drop_rate: counters.drop_rate(),
        counters,
        latency_us: state.forward.latency().snapshot(),
    })
}

// === Errors ===

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error response mapped from [`FastpathError`]
#[derive(Debug)]
pub struct ApiError(pub FastpathError);

impl From<FastpathError> for ApiError {
    fn from(e: FastpathError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            FastpathError::Pool(PoolError::PoolExhausted | PoolError::Timeout) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            FastpathError::Packet(PacketError::BufferTooSmall { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            FastpathError::Packet(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if crate::middleware::is_request_failure(status) {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
