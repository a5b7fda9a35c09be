//! Chat completion request/response types.

use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::engine::GenerationParams;
use crate::error::GatewayError;
use crate::models::common::{ChatMessage, Usage};

/// Chat completion request body.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl ChatCompletionRequest {
    /// Validate parameters and fill defaults from configuration.
    ///
    /// Out-of-range values are a client error, never silently clamped.
    pub fn generation_params(
        &self,
        config: &GatewayConfig,
    ) -> Result<GenerationParams, GatewayError> {
        if self.messages.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "messages must not be empty".to_string(),
            ));
        }
        let max_tokens = self.max_tokens.unwrap_or(config.max_tokens);
        if max_tokens == 0 {
            return Err(GatewayError::InvalidRequest(
                "max_tokens must be a positive integer".to_string(),
            ));
        }
        let temperature = self.temperature.unwrap_or(config.temperature);
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(GatewayError::InvalidRequest(format!(
                "temperature must be >= 0 (got {temperature})"
            )));
        }
        let top_p = self.top_p.unwrap_or(config.top_p);
        if !top_p.is_finite() || !(0.0..=1.0).contains(&top_p) {
            return Err(GatewayError::InvalidRequest(format!(
                "top_p must be in [0, 1] (got {top_p})"
            )));
        }
        Ok(GenerationParams {
            max_tokens,
            temperature,
            top_p,
            stop: self.stop.clone().unwrap_or_default(),
        })
    }
}

/// Chat completion choice.
#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: ChatMessage,
    pub finish_reason: String,
}

/// Chat completion response.
#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}
