//! Server-Sent Events (SSE) shaping of a completion stream.
//!
//! Implements the OpenAI-compatible streaming protocol:
//! - Each chunk is sent as `data: {json}\n\n`
//! - First chunk announces the assistant role
//! - Final chunk carries a non-null finish reason, then `data: [DONE]\n\n`
//! - When the client disconnects, axum drops the stream; the orchestrator's
//!   fragment stream (and the admission slot it owns) is dropped with it.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use futures::StreamExt;
use serde_json::json;

use crate::engine::Fragment;
use crate::models::streaming::{ChatChoiceDelta, ChatCompletionChunk, ChatDelta};
use crate::orchestrator::CompletionStream;

/// Wrap an orchestrator fragment stream into OpenAI chunk framing.
pub fn sse_chat_completion(
    id: String,
    created: u64,
    model: String,
    fragments: CompletionStream,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let stream = async_stream::stream! {
        let chunk = |delta: ChatDelta, finish_reason: Option<String>| ChatCompletionChunk {
            id: id.clone(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.clone(),
            choices: vec![ChatChoiceDelta {
                index: 0,
                delta,
                finish_reason,
            }],
        };

        // Role announcement.
        let role_chunk = chunk(
            ChatDelta {
                role: Some("assistant".to_string()),
                content: None,
            },
            None,
        );
        yield Ok(Event::default().data(serde_json::to_string(&role_chunk).unwrap()));

        let mut fragments = fragments;
        while let Some(item) = fragments.next().await {
            match item {
                Ok(Fragment::Text(text)) => {
                    let content_chunk = chunk(
                        ChatDelta {
                            role: None,
                            content: Some(text),
                        },
                        None,
                    );
                    yield Ok(Event::default().data(serde_json::to_string(&content_chunk).unwrap()));
                }
                Ok(Fragment::Done(reason)) => {
                    let final_chunk = chunk(
                        ChatDelta {
                            role: None,
                            content: None,
                        },
                        Some(reason.as_str().to_string()),
                    );
                    yield Ok(Event::default().data(serde_json::to_string(&final_chunk).unwrap()));
                    yield Ok(Event::default().data("[DONE]"));
                    return;
                }
                Err(err) => {
                    // Headers are already sent; the best we can do is report
                    // the failure in-band and end the stream.
                    tracing::warn!(error = %err, "completion stream failed mid-flight");
                    let body = json!({
                        "error": {
                            "message": err.to_string(),
                            "type": "server_error",
                            "param": null,
                            "code": null,
                        }
                    });
                    yield Ok(Event::default().data(body.to_string()));
                    return;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
