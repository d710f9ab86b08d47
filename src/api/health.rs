use axum::{Json, extract::State as AxumState};
use serde::Serialize;

use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub started_at: String,
    pub uptime_seconds: u64,
}

/// GET /healthz
pub async fn healthz(AxumState(state): AxumState<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "healthy",
        started_at: state.started_at.to_rfc3339(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
