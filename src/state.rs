//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::lifecycle::ModelLifecycleManager;
use crate::orchestrator::CompletionOrchestrator;

/// Shared handler state. Cheap to clone; everything inside is `Arc`ed.
#[derive(Clone)]
pub struct AppState {
    /// Request pipeline façade.
    pub orchestrator: Arc<CompletionOrchestrator>,
    /// Model registry, also needed directly for health and shutdown.
    pub lifecycle: Arc<ModelLifecycleManager>,
    /// Immutable process configuration.
    pub config: Arc<GatewayConfig>,
}
