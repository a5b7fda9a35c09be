//! # llm-gateway
//!
//! OpenAI-compatible HTTP gateway in front of a locally hosted language model.
//!
//! The gateway orchestrates requests rather than running inference itself:
//! it loads models on demand (single-flight per model id), bounds concurrent
//! generation behind an admission semaphore, flattens conversations into a
//! single prompt, and shapes results into the `chat.completion` wire contract
//! in both whole-response and SSE streaming modes. The actual generation
//! backend is an injected [`engine::TextEngine`] implementation.

pub mod admission;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod server;
pub mod state;
pub mod streaming;

pub use admission::{AdmissionController, AdmissionSlot};
pub use config::GatewayConfig;
pub use engine::{FinishReason, Fragment, MockEngine, TextEngine};
pub use error::GatewayError;
pub use lifecycle::ModelLifecycleManager;
pub use orchestrator::CompletionOrchestrator;
pub use server::{create_router, run_server};
pub use state::AppState;
