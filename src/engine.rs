//! The generation backend contract.
//!
//! [`TextEngine`] is the narrow waist between the gateway and whatever
//! actually runs inference. The gateway depends on engine *behavior* only:
//! load/unload model weights, turn a prompt into text (whole or as a fragment
//! stream), and report the model catalog. Backends can swap without touching
//! the orchestration code.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by a generation backend.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The model id is unknown to the backend. Not retryable.
    #[error("model not found: {0}")]
    NotFound(String),
    /// Loading the model weights failed. Retryable.
    #[error("model load failed: {0}")]
    Load(String),
    /// Generation itself failed after the model was resident.
    #[error("generation failed: {0}")]
    Generation(String),
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of output.
    Stop,
    /// The `max_tokens` budget was exhausted.
    Length,
    /// A configured stop sequence was produced.
    StopSequence,
}

impl FinishReason {
    /// Stable wire string used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::StopSequence => "stop_sequence",
        }
    }
}

/// One unit of a streaming generation.
///
/// A well-formed stream yields zero or more `Text` fragments followed by
/// exactly one `Done` carrying the finish reason.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    Done(FinishReason),
}

/// A lazy, finite, non-restartable sequence of generation fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

/// Sampling and limit parameters passed through to the backend.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

/// The backend trait everything plugs into.
///
/// Methods take `&self`; implementations are responsible for their own
/// interior mutability so the engine can be shared across requests.
#[async_trait]
pub trait TextEngine: Send + Sync {
    /// Load model weights into memory. Idempotent from the gateway's view;
    /// the lifecycle manager guarantees single-flight per model id.
    async fn load(&self, model_id: &str) -> Result<()>;

    /// Release model weights. Unknown or unloaded ids are a no-op.
    async fn unload(&self, model_id: &str) -> Result<()>;

    /// Generate a whole completion for a prompt.
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<(String, FinishReason)>;

    /// Generate incrementally.
    ///
    /// The default implementation degrades to [`TextEngine::generate`]: one
    /// text fragment followed by the terminal marker. Callers see the same
    /// framing either way, so backends without native streaming need not
    /// override this.
    async fn generate_stream(
        &self,
        model_id: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<FragmentStream> {
        let (text, reason) = self.generate(model_id, prompt, params).await?;
        let stream = futures::stream::iter(vec![Ok(Fragment::Text(text)), Ok(Fragment::Done(reason))]);
        Ok(Box::pin(stream))
    }

    /// Model ids this backend can serve.
    async fn catalog(&self) -> Vec<String>;
}

/// Deterministic in-process engine for development and tests.
///
/// Echoes a transformation of the prompt: output is the prompt's words
/// reversed, capped by `max_tokens`, one word per stream fragment. Load
/// invocations are counted per model id so tests can assert the
/// single-flight property.
pub struct MockEngine {
    known_models: Vec<String>,
    load_delay: Option<Duration>,
    generate_delay: Option<Duration>,
    load_calls: Mutex<HashMap<String, usize>>,
    generate_calls: AtomicUsize,
    fail_loads: Mutex<HashMap<String, String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_catalog(vec!["demo-1".to_string(), "demo-2".to_string()])
    }

    pub fn with_catalog(known_models: Vec<String>) -> Self {
        Self {
            known_models,
            load_delay: None,
            generate_delay: None,
            load_calls: Mutex::new(HashMap::new()),
            generate_calls: AtomicUsize::new(0),
            fail_loads: Mutex::new(HashMap::new()),
        }
    }

    /// Delay each load by `delay`, to widen race windows in tests.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Delay each generation by `delay`.
    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = Some(delay);
        self
    }

    /// Make loads of `model_id` fail with `reason` until cleared.
    pub fn fail_load(&self, model_id: &str, reason: &str) {
        self.fail_loads
            .lock()
            .unwrap()
            .insert(model_id.to_string(), reason.to_string());
    }

    /// Clear an injected load failure.
    pub fn clear_load_failure(&self, model_id: &str) {
        self.fail_loads.lock().unwrap().remove(model_id);
    }

    /// Number of times `load` was invoked for `model_id`.
    pub fn load_calls(&self, model_id: &str) -> usize {
        self.load_calls
            .lock()
            .unwrap()
            .get(model_id)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of `generate`/`generate_stream` invocations.
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    fn produce_words(&self, prompt: &str, params: &GenerationParams) -> (Vec<String>, FinishReason) {
        let mut words: Vec<String> = prompt
            .split_whitespace()
            .rev()
            .map(|w| w.to_string())
            .collect();
        if words.is_empty() {
            words.push("ok".to_string());
        }

        let mut out = Vec::new();
        for word in words {
            if out.len() >= params.max_tokens {
                return (out, FinishReason::Length);
            }
            if params.stop.iter().any(|s| !s.is_empty() && word.contains(s.as_str())) {
                return (out, FinishReason::StopSequence);
            }
            out.push(word);
        }
        (out, FinishReason::Stop)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextEngine for MockEngine {
    async fn load(&self, model_id: &str) -> Result<()> {
        if !self.known_models.iter().any(|m| m == model_id) {
            return Err(EngineError::NotFound(model_id.to_string()));
        }
        *self
            .load_calls
            .lock()
            .unwrap()
            .entry(model_id.to_string())
            .or_insert(0) += 1;
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.fail_loads.lock().unwrap().get(model_id) {
            return Err(EngineError::Load(reason.clone()));
        }
        Ok(())
    }

    async fn unload(&self, _model_id: &str) -> Result<()> {
        Ok(())
    }

    async fn generate(
        &self,
        _model_id: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<(String, FinishReason)> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.generate_delay {
            tokio::time::sleep(delay).await;
        }
        let (words, reason) = self.produce_words(prompt, params);
        Ok((words.join(" "), reason))
    }

    async fn generate_stream(
        &self,
        _model_id: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<FragmentStream> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.generate_delay {
            tokio::time::sleep(delay).await;
        }
        let (words, reason) = self.produce_words(prompt, params);
        let mut items: Vec<Result<Fragment>> = Vec::with_capacity(words.len() + 1);
        for (i, word) in words.into_iter().enumerate() {
            let text = if i == 0 { word } else { format!(" {word}") };
            items.push(Ok(Fragment::Text(text)));
        }
        items.push(Ok(Fragment::Done(reason)));
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn catalog(&self) -> Vec<String> {
        self.known_models.clone()
    }
}
