//! HTTP request handlers for API endpoints.

pub mod chat;
pub mod health;
pub mod models;

pub use chat::handle_chat_completion;
pub use health::{handle_health, handle_live, handle_ready};
pub use models::{handle_get_model, handle_list_models};
