//! HTTP request handlers

use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::inference::Predictions;
use crate::training::MetricsReport;

use super::error::{Result, ServerError};
use super::state::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let set = state.service.snapshot();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "run_id": set.run_id(),
        "models": set.model_names(),
        "uptime_secs": state.uptime_secs(),
    }))
}

/// The feature contract requests must satisfy
pub async fn get_schema(State(state): State<Arc<AppState>>) -> Json<Value> {
    let set = state.service.snapshot();
    let manifest = set.manifest();
    Json(json!({
        "run_id": manifest.run_id,
        "created_at": manifest.created_at.to_rfc3339(),
        "schema": manifest.schema,
        "feature_names": manifest.feature_names,
        "requires_dropoff": manifest.schema.requires_dropoff(),
        "models": manifest.models,
    }))
}

/// One prediction per model for a single observation
pub async fn predict(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Predictions>> {
    let request: Value = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("Invalid JSON body: {}", e)))?;

    let worker = Arc::clone(&state);
    let outcome = tokio::task::spawn_blocking(move || worker.service.predict_json(&request))
        .await
        .map_err(|e| ServerError::Internal(format!("prediction task failed: {}", e)))?;

    match outcome {
        Ok(predictions) => Ok(Json(predictions)),
        Err(e) => {
            if e.is_client_error() {
                warn!(error = %e, "Rejected prediction request");
            }
            Err(e.into())
        }
    }
}

/// Held-out metrics of the live run, as persisted
pub async fn get_results(State(state): State<Arc<AppState>>) -> Json<MetricsReport> {
    Json(state.service.results())
}

/// Swap in the most recently published run
pub async fn reload(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let worker = Arc::clone(&state);
    let run_id = tokio::task::spawn_blocking(move || worker.service.reload())
        .await
        .map_err(|e| ServerError::Internal(format!("reload task failed: {}", e)))??;

    info!(run_id = %run_id, "Artifacts reloaded via API");
    Ok(Json(json!({ "run_id": run_id })))
}
