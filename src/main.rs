use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use llm_gateway::{
    AdmissionController, AppState, CompletionOrchestrator, GatewayConfig, MockEngine,
    ModelLifecycleManager,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::parse();

    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        cache_dir = %config.model_cache_dir,
        use_gpu = config.use_gpu,
        max_concurrent = config.max_concurrent_requests,
        "starting llm-gateway"
    );

    // The deterministic in-process engine stands in for a real weights
    // backend; the orchestration layer is identical either way.
    let engine = Arc::new(MockEngine::new());

    let admission = Arc::new(AdmissionController::new(config.max_concurrent_requests)?);
    let lifecycle = Arc::new(ModelLifecycleManager::new(engine.clone()));
    let orchestrator = Arc::new(CompletionOrchestrator::new(
        engine,
        lifecycle.clone(),
        admission,
        config.admission_timeout(),
        config.request_timeout(),
    ));

    // Warm the default model; failure is survivable since models load on
    // demand per request.
    if let Err(err) = lifecycle.ensure_loaded(&config.default_model).await {
        tracing::warn!(model = %config.default_model, error = %err, "default model preload failed");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState {
        orchestrator,
        lifecycle,
        config: Arc::new(config),
    };

    tracing::info!("listening on {addr}");
    llm_gateway::run_server(state, addr).await?;
    tracing::info!("shutdown complete");
    Ok(())
}
