//! HTTP error handling and response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::engine::EngineError;

/// Gateway-level error taxonomy.
///
/// Collaborator failures are mapped into one of these kinds at the
/// orchestrator boundary; nothing is swallowed on the way up.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed request body or out-of-range generation parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The backend does not know this model id. Not retryable.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Loading the model failed; a later retry may succeed.
    #[error("model {model} failed to load: {reason}")]
    ModelLoad { model: String, reason: String },

    /// No admission slot became free within the configured timeout.
    #[error("server busy: no capacity within {waited_ms}ms")]
    ServerBusy { waited_ms: u64 },

    /// Generation exceeded the configured request timeout.
    #[error("generation timed out after {timeout_secs}s")]
    GenerationTimeout { timeout_secs: u64 },

    /// Opaque failure from the generation backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Invalid process configuration detected at runtime.
    #[error("configuration error: {0}")]
    Config(String),

    /// Defensive fallback for programming errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Map a backend load-path error onto the gateway taxonomy.
    pub fn from_load_error(model: &str, err: EngineError) -> Self {
        match err {
            EngineError::NotFound(id) => GatewayError::ModelNotFound(id),
            EngineError::Load(reason) => GatewayError::ModelLoad {
                model: model.to_string(),
                reason,
            },
            EngineError::Generation(msg) => GatewayError::Backend(msg),
        }
    }
}

impl From<EngineError> for GatewayError {
    /// Generation-path mapping; load-path callers use [`GatewayError::from_load_error`].
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(id) => GatewayError::ModelNotFound(id),
            EngineError::Load(reason) => GatewayError::Backend(reason),
            EngineError::Generation(msg) => GatewayError::Backend(msg),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            GatewayError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                msg.clone(),
            ),
            GatewayError::ModelNotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                format!("model {id} not found"),
            ),
            GatewayError::ModelLoad { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "server_error",
                format!("{self}, retry later"),
            ),
            GatewayError::ServerBusy { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "server_error",
                "server at capacity, try again later".to_string(),
            ),
            GatewayError::GenerationTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "server_error", self.to_string())
            }
            GatewayError::Backend(msg) => (StatusCode::BAD_GATEWAY, "server_error", msg.clone()),
            GatewayError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                msg.clone(),
            ),
            GatewayError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                msg.clone(),
            ),
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "param": null,
                "code": null,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (
                GatewayError::InvalidRequest("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::ModelNotFound("ghost".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                GatewayError::ModelLoad {
                    model: "m".into(),
                    reason: "oom".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GatewayError::ServerBusy { waited_ms: 10 },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GatewayError::GenerationTimeout { timeout_secs: 300 },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (GatewayError::Backend("boom".into()), StatusCode::BAD_GATEWAY),
            (
                GatewayError::Internal("bug".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn load_path_not_found_is_404() {
        let err =
            GatewayError::from_load_error("ghost", EngineError::NotFound("ghost".to_string()));
        assert!(matches!(err, GatewayError::ModelNotFound(_)));
    }

    #[test]
    fn load_path_failure_is_retryable_503() {
        let err = GatewayError::from_load_error("m", EngineError::Load("disk".to_string()));
        assert!(matches!(err, GatewayError::ModelLoad { .. }));
    }
}
