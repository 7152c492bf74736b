//! Ramp status and manual processing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::RampId;
use domain::{PhaseHistoryEntry, ProcessingLock, RampDirection, RampErrorLog, RampPhase, RampRecord};
use ramp_store::RampStore;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

// -- Response types --

#[derive(Serialize)]
pub struct RampStatusResponse {
    pub id: String,
    pub direction: RampDirection,
    pub current_phase: RampPhase,
    pub phase_history: Vec<PhaseHistoryEntry>,
    pub error_logs: Vec<RampErrorLog>,
    pub processing_lock: ProcessingLock,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RampRecord> for RampStatusResponse {
    fn from(ramp: RampRecord) -> Self {
        Self {
            id: ramp.id.to_string(),
            direction: ramp.direction,
            current_phase: ramp.current_phase,
            phase_history: ramp.phase_history,
            error_logs: ramp.error_logs.as_slice().to_vec(),
            processing_lock: ramp.processing_lock,
            version: ramp.version,
            created_at: ramp.created_at,
            updated_at: ramp.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct ProcessAcceptedResponse {
    pub ramp_id: String,
    pub current_phase: RampPhase,
}

// -- Handlers --

/// GET /ramps/{id}: current phase, history, error log and lock of a ramp.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RampStatusResponse>, ApiError> {
    let ramp = find_ramp(&state, &id).await?;
    Ok(Json(ramp.into()))
}

/// POST /ramps/{id}/process: runs the saga for a ramp in the background.
///
/// Responds immediately; a ramp already being processed is left to the
/// running execution.
pub async fn process(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ProcessAcceptedResponse>), ApiError> {
    let Some(processor) = state.processor.clone() else {
        return Err(ApiError::Unavailable(
            "Ramp processing is disabled: no chain or payment client is configured".to_string(),
        ));
    };
    let ramp = find_ramp(&state, &id).await?;
    if ramp.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Ramp {} is already in terminal phase {}",
            ramp.id, ramp.current_phase
        )));
    }

    metrics::counter!("ramp_manual_process_requests_total").increment(1);
    let ramp_id = ramp.id;
    tokio::spawn(async move {
        match processor.process_ramp(ramp_id).await {
            Ok(outcome) => tracing::info!(%ramp_id, ?outcome, "Manual processing finished"),
            Err(err) => tracing::warn!(%ramp_id, error = %err, "Manual processing stopped with error"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ProcessAcceptedResponse {
            ramp_id: ramp.id.to_string(),
            current_phase: ramp.current_phase,
        }),
    ))
}

async fn find_ramp(state: &AppState, id: &str) -> Result<RampRecord, ApiError> {
    let ramp_id = parse_ramp_id(id)?;
    state
        .store
        .find_by_id(ramp_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Ramp {ramp_id} not found")))
}

fn parse_ramp_id(id: &str) -> Result<RampId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
