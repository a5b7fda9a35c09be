//! Server setup, routing, and middleware.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::{handlers, state::AppState};

/// Create the API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/v1/chat/completions",
            post(handlers::chat::handle_chat_completion),
        )
        .route("/v1/models", get(handlers::models::handle_list_models))
        .route(
            "/v1/models/{model_id}",
            get(handlers::models::handle_get_model),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let health = Router::new()
        .route("/health", get(handlers::health::handle_health))
        .route("/health/", get(handlers::health::handle_health))
        .route("/health/ready", get(handlers::health::handle_ready))
        .route("/health/live", get(handlers::health::handle_live));

    let mut app = api
        .merge(health)
        .layer(middleware::from_fn(request_context));

    if state.config.enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app.with_state(state)
}

/// Run the HTTP server until a shutdown signal arrives, then release all
/// loaded models.
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let lifecycle = state.lifecycle.clone();
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    lifecycle.unload_all().await;
    Ok(())
}

/// Attach a correlation id and processing time to every response and emit
/// one request log line.
async fn request_context(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let mut response = next.run(req).await;

    let elapsed = start.elapsed();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        response.headers_mut().insert("x-process-time", value);
    }

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "request processed"
    );
    response
}

/// Bearer-token check for API routes. Health endpoints stay open.
async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.config.enable_auth {
        return next.run(req).await;
    }

    let expected = match state.config.api_key.as_deref() {
        Some(key) if !key.is_empty() => key,
        _ => {
            // Auth enabled without a key is a deployment mistake; reject
            // everything rather than letting requests through unchecked.
            return unauthorized("authentication is enabled but no API key is configured");
        }
    };

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => next.run(req).await,
        _ => unauthorized("invalid or missing API key"),
    }
}

fn unauthorized(message: &str) -> Response {
    let body = Json(json!({
        "error": {
            "message": message,
            "type": "invalid_request_error",
            "param": null,
            "code": null,
        }
    }));
    (StatusCode::UNAUTHORIZED, body).into_response()
}
