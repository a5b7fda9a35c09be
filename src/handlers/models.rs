//! Model catalog handlers.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::GatewayError,
    models::{ModelInfo, ModelsResponse},
    state::AppState,
};

/// List models the backend can serve.
pub async fn handle_list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let ids = state.orchestrator.catalog().await;
    Json(ModelsResponse::new(
        ids.into_iter().map(ModelInfo::new).collect(),
    ))
}

/// Look up a single model by id.
pub async fn handle_get_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> Result<Json<ModelInfo>, GatewayError> {
    let ids = state.orchestrator.catalog().await;
    if ids.iter().any(|id| id == &model_id) {
        Ok(Json(ModelInfo::new(model_id)))
    } else {
        Err(GatewayError::ModelNotFound(model_id))
    }
}
