//! Health, readiness, and liveness handlers.
//!
//! Process status is reported independent of model state; the main health
//! endpoint additionally exposes admission gauges and loaded models for
//! operators.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    let admission = state.orchestrator.admission();
    Json(json!({
        "status": "healthy",
        "admission": {
            "in_flight": admission.in_flight(),
            "waiting": admission.waiting(),
            "limit": admission.limit(),
        },
        "models": {
            "loaded": state.lifecycle.list_loaded(),
        }
    }))
}

pub async fn handle_ready(State(_state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ready",
        "message": "gateway is ready to serve requests"
    }))
}

pub async fn handle_live() -> Json<Value> {
    Json(json!({
        "status": "alive",
        "message": "gateway is alive"
    }))
}
