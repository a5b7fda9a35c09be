//! Common types used across chat and catalog models.

use serde::{Deserialize, Serialize};

/// Token usage statistics.
///
/// Counts are whitespace word-count estimates, not tokenizer output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn from_texts(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = crate::prompt::estimate_tokens(prompt);
        let completion_tokens = crate::prompt::estimate_tokens(completion);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Chat message: one dialogue turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}
