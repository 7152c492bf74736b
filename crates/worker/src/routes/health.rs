//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Phases this worker has a handler for; empty when it only serves status.
    pub phases: Vec<&'static str>,
}

/// GET /health: liveness plus the phases this worker can drive.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let phases = state
        .processor
        .as_ref()
        .map(|processor| {
            processor
                .registry()
                .phases()
                .into_iter()
                .map(|phase| phase.as_str())
                .collect()
        })
        .unwrap_or_default();
    Json(HealthResponse {
        status: "ok",
        phases,
    })
}
