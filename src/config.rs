//! Environment-sourced process configuration.
//!
//! All settings are consumed once at startup and immutable afterwards.
//! Each flag can also be set through the corresponding environment variable.

use std::time::Duration;

use clap::Parser;

/// Gateway configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "llm-gateway", version, about = "OpenAI-compatible gateway for a local language model")]
pub struct GatewayConfig {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP server to.
    #[arg(long, env = "API_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Model loaded at startup and reported as the default.
    #[arg(long, env = "DEFAULT_MODEL_NAME", default_value = "demo-1")]
    pub default_model: String,

    /// Directory where model weights are cached.
    #[arg(long, env = "MODEL_CACHE_DIR", default_value = "./models")]
    pub model_cache_dir: String,

    /// Default generation budget when the request omits max_tokens.
    #[arg(long, env = "MAX_TOKENS", default_value_t = 2048)]
    pub max_tokens: usize,

    /// Default sampling temperature.
    #[arg(long, env = "TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    /// Default nucleus sampling threshold.
    #[arg(long, env = "TOP_P", default_value_t = 0.9)]
    pub top_p: f32,

    /// Concurrency ceiling for generation requests.
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value_t = 10)]
    pub max_concurrent_requests: usize,

    /// Generation timeout in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 300)]
    pub request_timeout_secs: u64,

    /// How long a request may wait for an admission slot, in seconds.
    #[arg(long, env = "ADMISSION_TIMEOUT", default_value_t = 30)]
    pub admission_timeout_secs: u64,

    /// Allow cross-origin requests.
    #[arg(long, env = "ENABLE_CORS", default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_cors: bool,

    /// Require a bearer token on API routes.
    #[arg(long, env = "ENABLE_AUTH", default_value_t = false, action = clap::ArgAction::Set)]
    pub enable_auth: bool,

    /// Bearer token checked when auth is enabled.
    #[arg(long, env = "API_KEY")]
    pub api_key: Option<String>,

    /// Run the backend on GPU where available.
    #[arg(long, env = "USE_GPU", default_value_t = false, action = clap::ArgAction::Set)]
    pub use_gpu: bool,

    /// Log filter, e.g. "info" or "llm_gateway=debug".
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_secs)
    }
}

impl Default for GatewayConfig {
    /// Defaults as if no flags or environment were set. Used by tests;
    /// `main` parses the real environment via clap.
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            default_model: "demo-1".to_string(),
            model_cache_dir: "./models".to_string(),
            max_tokens: 2048,
            temperature: 0.7,
            top_p: 0.9,
            max_concurrent_requests: 10,
            request_timeout_secs: 300,
            admission_timeout_secs: 30,
            enable_cors: true,
            enable_auth: false,
            api_key: None,
            use_gpu: false,
            log_level: "info".to_string(),
        }
    }
}
