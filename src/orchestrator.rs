//! Request orchestration.
//!
//! [`CompletionOrchestrator`] is the façade the transport layer calls. It
//! sequences ensure-loaded → admit → format prompt → generate → assemble,
//! in whole-response and streaming modes, and owns the mapping of
//! collaborator failures onto the gateway error taxonomy.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::Stream;
use futures::StreamExt;

use crate::admission::AdmissionController;
use crate::engine::{FinishReason, Fragment, GenerationParams, TextEngine};
use crate::error::GatewayError;
use crate::lifecycle::ModelLifecycleManager;
use crate::models::common::{ChatMessage, Usage};
use crate::prompt::format_conversation;

/// One completion request, transport-independent.
#[derive(Debug)]
pub struct CompletionRequest {
    /// Correlation id, e.g. "chatcmpl-…".
    pub id: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
}

/// A finished whole-response completion.
#[derive(Debug)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Lazy fragment sequence for a streaming completion.
///
/// The stream owns the request's admission slot; dropping it (client
/// disconnect included) stops consumption of the backend stream and returns
/// the slot. Exactly one terminal [`Fragment::Done`] is emitted on the
/// non-error path.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<Fragment, GatewayError>> + Send>>;

pub struct CompletionOrchestrator {
    engine: Arc<dyn TextEngine>,
    lifecycle: Arc<ModelLifecycleManager>,
    admission: Arc<AdmissionController>,
    admission_timeout: Duration,
    generation_timeout: Duration,
}

impl CompletionOrchestrator {
    pub fn new(
        engine: Arc<dyn TextEngine>,
        lifecycle: Arc<ModelLifecycleManager>,
        admission: Arc<AdmissionController>,
        admission_timeout: Duration,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            lifecycle,
            admission,
            admission_timeout,
            generation_timeout,
        }
    }

    /// Run the whole-response pipeline.
    ///
    /// The admission slot is held across generation and released on every
    /// exit path, success or not, when it goes out of scope.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GatewayError> {
        self.lifecycle.ensure_loaded(&request.model).await?;

        let _slot = self.admission.acquire(self.admission_timeout).await?;
        let prompt = format_conversation(&request.messages);

        tracing::debug!(request_id = %request.id, model = %request.model, "generating completion");
        let generated = tokio::time::timeout(
            self.generation_timeout,
            self.engine.generate(&request.model, &prompt, &request.params),
        )
        .await
        .map_err(|_| GatewayError::GenerationTimeout {
            timeout_secs: self.generation_timeout.as_secs(),
        })??;

        let (text, finish_reason) = generated;
        let usage = Usage::from_texts(&prompt, &text);
        Ok(Completion {
            text,
            finish_reason,
            usage,
        })
    }

    /// Run the streaming pipeline.
    ///
    /// Admission and model load happen before the first fragment; the
    /// returned stream then forwards backend fragments as they arrive. If a
    /// backend ends its stream without a terminal marker, one is synthesized
    /// so callers always observe exactly one finish reason.
    pub async fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, GatewayError> {
        self.lifecycle.ensure_loaded(&request.model).await?;

        let slot = self.admission.acquire(self.admission_timeout).await?;
        let prompt = format_conversation(&request.messages);

        tracing::debug!(request_id = %request.id, model = %request.model, "starting completion stream");
        let inner = tokio::time::timeout(
            self.generation_timeout,
            self.engine
                .generate_stream(&request.model, &prompt, &request.params),
        )
        .await
        .map_err(|_| GatewayError::GenerationTimeout {
            timeout_secs: self.generation_timeout.as_secs(),
        })??;

        let request_id = request.id.clone();
        let stream = async_stream::stream! {
            // Slot rides with the stream: released when the stream is fully
            // consumed or dropped mid-flight.
            let _slot = slot;
            let mut inner = inner;
            let mut finished = false;

            while let Some(item) = inner.next().await {
                match item {
                    Ok(Fragment::Done(reason)) => {
                        finished = true;
                        yield Ok(Fragment::Done(reason));
                        break;
                    }
                    Ok(fragment) => yield Ok(fragment),
                    Err(err) => {
                        tracing::warn!(request_id = %request_id, error = %err, "backend stream failed");
                        yield Err(GatewayError::from(err));
                        return;
                    }
                }
            }

            if !finished {
                yield Ok(Fragment::Done(FinishReason::Stop));
            }
        };
        Ok(Box::pin(stream))
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn lifecycle(&self) -> &ModelLifecycleManager {
        &self.lifecycle
    }

    pub async fn catalog(&self) -> Vec<String> {
        self.engine.catalog().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    fn request(model: &str, content: &str, max_tokens: usize) -> CompletionRequest {
        CompletionRequest {
            id: "chatcmpl-test".to_string(),
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: content.to_string(),
            }],
            params: GenerationParams {
                max_tokens,
                temperature: 0.7,
                top_p: 0.9,
                stop: Vec::new(),
            },
        }
    }

    fn orchestrator(engine: Arc<MockEngine>, limit: usize) -> CompletionOrchestrator {
        let lifecycle = Arc::new(ModelLifecycleManager::new(engine.clone()));
        let admission = Arc::new(AdmissionController::new(limit).unwrap());
        CompletionOrchestrator::new(
            engine,
            lifecycle,
            admission,
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn whole_response_finishes_with_stop() {
        let engine = Arc::new(MockEngine::new());
        let orch = orchestrator(engine, 2);

        let completion = orch.complete(&request("demo-1", "hello world", 32)).await.unwrap();
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert!(!completion.text.is_empty());
        assert!(completion.usage.prompt_tokens > 0);
        assert_eq!(
            completion.usage.total_tokens,
            completion.usage.prompt_tokens + completion.usage.completion_tokens
        );
    }

    #[tokio::test]
    async fn stream_concatenates_to_whole_response() {
        let engine = Arc::new(MockEngine::new());
        let orch = orchestrator(engine, 2);

        let whole = orch.complete(&request("demo-1", "a b c", 32)).await.unwrap();

        let mut stream = orch
            .complete_stream(&request("demo-1", "a b c", 32))
            .await
            .unwrap();
        let mut text = String::new();
        let mut reason = None;
        while let Some(item) = stream.next().await {
            match item.unwrap() {
                Fragment::Text(t) => text.push_str(&t),
                Fragment::Done(r) => reason = Some(r),
            }
        }
        assert_eq!(text, whole.text);
        assert_eq!(reason, Some(whole.finish_reason));
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_before_admission() {
        let engine = Arc::new(MockEngine::new());
        let orch = orchestrator(engine.clone(), 1);

        let err = orch.complete(&request("ghost", "hi", 8)).await;
        assert!(matches!(err, Err(GatewayError::ModelNotFound(_))));
        assert_eq!(engine.generate_calls(), 0);
        assert_eq!(orch.admission().in_flight(), 0);
    }

    #[tokio::test]
    async fn saturated_admission_times_out_without_generating() {
        let engine = Arc::new(MockEngine::new().with_generate_delay(Duration::from_millis(300)));
        let lifecycle = Arc::new(ModelLifecycleManager::new(engine.clone()));
        let admission = Arc::new(AdmissionController::new(1).unwrap());
        let orch = Arc::new(CompletionOrchestrator::new(
            engine.clone(),
            lifecycle,
            admission,
            Duration::ZERO,
            Duration::from_secs(5),
        ));

        lifecycle_warmup(&orch).await;
        let first = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.complete(&request("demo-1", "slow", 8)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let generate_calls_before = engine.generate_calls();

        let err = orch.complete(&request("demo-1", "fast", 8)).await;
        assert!(matches!(err, Err(GatewayError::ServerBusy { .. })));
        assert_eq!(engine.generate_calls(), generate_calls_before);

        first.await.unwrap().unwrap();
        assert_eq!(orch.admission().in_flight(), 0);
    }

    async fn lifecycle_warmup(orch: &CompletionOrchestrator) {
        orch.lifecycle().ensure_loaded("demo-1").await.unwrap();
    }

    #[tokio::test]
    async fn admission_serializes_when_limit_is_one() {
        let engine = Arc::new(MockEngine::new().with_generate_delay(Duration::from_millis(100)));
        let lifecycle = Arc::new(ModelLifecycleManager::new(engine.clone()));
        let admission = Arc::new(AdmissionController::new(1).unwrap());
        let orch = Arc::new(CompletionOrchestrator::new(
            engine,
            lifecycle,
            admission,
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        lifecycle_warmup(&orch).await;

        let spans = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let orch = orch.clone();
            let spans = spans.clone();
            handles.push(tokio::spawn(async move {
                let start = std::time::Instant::now();
                orch.complete(&request("demo-1", "x", 8)).await.unwrap();
                spans.lock().unwrap().push((start, std::time::Instant::now()));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // With one slot the generation windows must not overlap. Generation
        // takes 100ms, so the later request cannot have finished sooner than
        // 200ms after the earlier one started.
        let spans = spans.lock().unwrap();
        let earliest_start = spans.iter().map(|(s, _)| *s).min().unwrap();
        let latest_end = spans.iter().map(|(_, e)| *e).max().unwrap();
        assert!(latest_end.duration_since(earliest_start) >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn dropping_stream_midway_releases_the_slot() {
        let engine = Arc::new(MockEngine::new());
        let orch = orchestrator(engine, 1);

        let mut stream = orch
            .complete_stream(&request("demo-1", "one two three four", 32))
            .await
            .unwrap();
        let _first = stream.next().await.unwrap().unwrap();
        assert_eq!(orch.admission().in_flight(), 1);
        drop(stream);

        assert_eq!(orch.admission().in_flight(), 0);
        // Capacity is immediately reusable.
        orch.complete(&request("demo-1", "hi", 8)).await.unwrap();
    }

    #[tokio::test]
    async fn generation_timeout_maps_to_distinct_error_and_frees_slot() {
        let engine = Arc::new(MockEngine::new().with_generate_delay(Duration::from_millis(200)));
        let lifecycle = Arc::new(ModelLifecycleManager::new(engine.clone()));
        let admission = Arc::new(AdmissionController::new(1).unwrap());
        let orch = CompletionOrchestrator::new(
            engine,
            lifecycle,
            admission,
            Duration::from_secs(1),
            Duration::from_millis(20),
        );

        let err = orch.complete(&request("demo-1", "hi", 8)).await;
        assert!(matches!(err, Err(GatewayError::GenerationTimeout { .. })));
        assert_eq!(orch.admission().in_flight(), 0);
    }

    #[tokio::test]
    async fn slot_count_is_conserved_after_mixed_outcomes() {
        let engine = Arc::new(MockEngine::new());
        let orch = Arc::new(orchestrator(engine, 4));

        let mut handles = Vec::new();
        for i in 0..12 {
            let orch = orch.clone();
            handles.push(tokio::spawn(async move {
                match i % 3 {
                    // Success.
                    0 => {
                        let _ = orch.complete(&request("demo-1", "ok", 8)).await;
                    }
                    // Client error: unknown model.
                    1 => {
                        let _ = orch.complete(&request("ghost", "ok", 8)).await;
                    }
                    // Cancellation: abandon a stream after one fragment.
                    _ => {
                        if let Ok(mut stream) =
                            orch.complete_stream(&request("demo-1", "a b c", 8)).await
                        {
                            let _ = stream.next().await;
                        }
                    }
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(orch.admission().in_flight(), 0);
        assert_eq!(orch.admission().waiting(), 0);
    }
}
