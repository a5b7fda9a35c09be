//! Chat completion handler.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::GatewayError,
    models::common::ChatMessage,
    models::{ChatChoice, ChatCompletionRequest, ChatCompletionResponse},
    orchestrator::CompletionRequest,
    state::AppState,
    streaming,
};

/// Handle chat completion requests (streaming and non-streaming).
///
/// Parameter validation happens here at the boundary; the orchestrator then
/// runs ensure-loaded → admit → format → generate and owns slot release on
/// every exit path, including client disconnect.
pub async fn handle_chat_completion(
    State(state): State<AppState>,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<axum::response::Response, GatewayError> {
    let params = req.generation_params(&state.config)?;

    let completion_id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let created = Utc::now().timestamp() as u64;
    let request = CompletionRequest {
        id: completion_id.clone(),
        model: req.model.clone(),
        messages: req.messages,
        params,
    };

    if req.stream {
        let fragments = state.orchestrator.complete_stream(&request).await?;
        return Ok(
            streaming::sse_chat_completion(completion_id, created, req.model, fragments)
                .into_response(),
        );
    }

    let completion = state.orchestrator.complete(&request).await?;
    Ok(Json(ChatCompletionResponse {
        id: completion_id,
        object: "chat.completion".to_string(),
        created,
        model: req.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: completion.text,
            },
            finish_reason: completion.finish_reason.as_str().to_string(),
        }],
        usage: completion.usage,
    })
    .into_response())
}
