//! OpenAI-compatible request/response types.

pub mod catalog;
pub mod chat;
pub mod common;
pub mod streaming;

pub use catalog::{ModelInfo, ModelsResponse};
pub use chat::{ChatChoice, ChatCompletionRequest, ChatCompletionResponse};
pub use common::{ChatMessage, Usage};
pub use streaming::ChatCompletionChunk;
