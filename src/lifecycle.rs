//! Model lifecycle management.
//!
//! Owns the per-model load state machine (Unloaded → Loading → Loaded or
//! Failed) and guarantees at most one in-flight backend load per model id.
//! Concurrent first requests for a cold model join the load already in
//! progress instead of triggering a duplicate one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::engine::{EngineError, TextEngine};
use crate::error::GatewayError;

/// Load state of one model id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Snapshot of a model's lifecycle, returned by [`ModelLifecycleManager::ensure_loaded`].
#[derive(Debug, Clone)]
pub struct ModelHandle {
    pub model_id: String,
    pub state: ModelState,
    pub load_started_at: Option<DateTime<Utc>>,
    pub load_completed_at: Option<DateTime<Utc>>,
    /// Cause of the most recent load failure, if any.
    pub last_error: Option<String>,
}

struct ModelEntry {
    /// Held for the duration of a load. Late arrivals for the same model id
    /// queue on this mutex and observe the finished state instead of loading
    /// again — the single-flight guarantee.
    flight: tokio::sync::Mutex<()>,
    status: Mutex<EntryStatus>,
}

#[derive(Clone)]
struct EntryStatus {
    state: ModelState,
    load_started_at: Option<DateTime<Utc>>,
    load_completed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ModelEntry {
    fn new() -> Self {
        Self {
            flight: tokio::sync::Mutex::new(()),
            status: Mutex::new(EntryStatus {
                state: ModelState::Unloaded,
                load_started_at: None,
                load_completed_at: None,
                last_error: None,
            }),
        }
    }

    fn snapshot(&self, model_id: &str) -> ModelHandle {
        let status = self.status.lock().unwrap();
        ModelHandle {
            model_id: model_id.to_string(),
            state: status.state.clone(),
            load_started_at: status.load_started_at,
            load_completed_at: status.load_completed_at,
            last_error: status.last_error.clone(),
        }
    }
}

/// Process-wide registry of model lifecycles.
///
/// The registry map and the loaded-order list are the only mutable state
/// here; both are guarded and never exposed for direct mutation.
pub struct ModelLifecycleManager {
    engine: Arc<dyn TextEngine>,
    entries: Mutex<HashMap<String, Arc<ModelEntry>>>,
    /// Model ids in order of first successful load.
    loaded_order: Mutex<Vec<String>>,
}

impl ModelLifecycleManager {
    pub fn new(engine: Arc<dyn TextEngine>) -> Self {
        Self {
            engine,
            entries: Mutex::new(HashMap::new()),
            loaded_order: Mutex::new(Vec::new()),
        }
    }

    fn entry(&self, model_id: &str) -> Arc<ModelEntry> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(model_id.to_string())
            .or_insert_with(|| Arc::new(ModelEntry::new()))
            .clone()
    }

    /// Make sure `model_id` is resident, loading it if necessary.
    ///
    /// Already-loaded models return immediately. A Failed model is
    /// retry-eligible: the next call attempts the load again. A backend
    /// "not found" is terminal for the call and leaves the entry Unloaded
    /// (nothing was loaded, nothing to retry).
    pub async fn ensure_loaded(&self, model_id: &str) -> Result<ModelHandle, GatewayError> {
        let entry = self.entry(model_id);

        let _flight = entry.flight.lock().await;

        // Whoever held the flight lock before us may have finished the load.
        if entry.status.lock().unwrap().state == ModelState::Loaded {
            return Ok(entry.snapshot(model_id));
        }

        let started = Utc::now();
        {
            let mut status = entry.status.lock().unwrap();
            status.state = ModelState::Loading;
            status.load_started_at = Some(started);
            status.load_completed_at = None;
        }
        tracing::info!(model = model_id, "loading model");

        match self.engine.load(model_id).await {
            Ok(()) => {
                {
                    let mut status = entry.status.lock().unwrap();
                    status.state = ModelState::Loaded;
                    status.load_completed_at = Some(Utc::now());
                    status.last_error = None;
                }
                let mut order = self.loaded_order.lock().unwrap();
                if !order.iter().any(|m| m == model_id) {
                    order.push(model_id.to_string());
                }
                tracing::info!(model = model_id, "model loaded");
                Ok(entry.snapshot(model_id))
            }
            Err(EngineError::NotFound(id)) => {
                entry.status.lock().unwrap().state = ModelState::Unloaded;
                tracing::warn!(model = model_id, "model not found in backend catalog");
                Err(GatewayError::ModelNotFound(id))
            }
            Err(err) => {
                {
                    let mut status = entry.status.lock().unwrap();
                    status.state = ModelState::Failed;
                    status.last_error = Some(err.to_string());
                }
                tracing::error!(model = model_id, error = %err, "model load failed");
                Err(GatewayError::from_load_error(model_id, err))
            }
        }
    }

    /// Non-blocking residency check.
    pub fn is_loaded(&self, model_id: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(model_id)
            .map(|e| e.status.lock().unwrap().state == ModelState::Loaded)
            .unwrap_or(false)
    }

    /// Loaded model ids, in order of first successful load.
    pub fn list_loaded(&self) -> Vec<String> {
        let order = self.loaded_order.lock().unwrap();
        order
            .iter()
            .filter(|id| self.is_loaded(id))
            .cloned()
            .collect()
    }

    /// Release one model. Unloading an id that is not loaded is a no-op.
    pub async fn unload(&self, model_id: &str) -> Result<(), GatewayError> {
        let entry = self.entry(model_id);
        // Serialize against any in-flight load of the same model.
        let _flight = entry.flight.lock().await;

        let was_resident = {
            let status = entry.status.lock().unwrap();
            matches!(status.state, ModelState::Loaded | ModelState::Failed)
        };
        if !was_resident {
            return Ok(());
        }

        self.engine.unload(model_id).await?;
        {
            let mut status = entry.status.lock().unwrap();
            status.state = ModelState::Unloaded;
            status.load_completed_at = None;
        }
        self.loaded_order.lock().unwrap().retain(|m| m != model_id);
        tracing::info!(model = model_id, "model unloaded");
        Ok(())
    }

    /// Release every loaded model, used at process shutdown.
    pub async fn unload_all(&self) {
        let ids: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        for id in ids {
            if let Err(err) = self.unload(&id).await {
                tracing::warn!(model = %id, error = %err, "unload failed during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_first_loads_are_single_flight() {
        let engine = Arc::new(MockEngine::new().with_load_delay(Duration::from_millis(50)));
        let manager = Arc::new(ModelLifecycleManager::new(engine.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.ensure_loaded("demo-1").await
            }));
        }
        for h in handles {
            let handle = h.await.unwrap().unwrap();
            assert_eq!(handle.state, ModelState::Loaded);
        }
        assert_eq!(engine.load_calls("demo-1"), 1);
    }

    #[tokio::test]
    async fn loaded_model_returns_without_reloading() {
        let engine = Arc::new(MockEngine::new());
        let manager = ModelLifecycleManager::new(engine.clone());

        manager.ensure_loaded("demo-1").await.unwrap();
        manager.ensure_loaded("demo-1").await.unwrap();
        assert_eq!(engine.load_calls("demo-1"), 1);
        assert!(manager.is_loaded("demo-1"));
    }

    #[tokio::test]
    async fn failed_load_is_retried_on_next_call() {
        let engine = Arc::new(MockEngine::new());
        engine.fail_load("demo-1", "out of memory");
        let manager = ModelLifecycleManager::new(engine.clone());

        let err = manager.ensure_loaded("demo-1").await;
        assert!(matches!(err, Err(GatewayError::ModelLoad { .. })));
        assert!(!manager.is_loaded("demo-1"));

        engine.clear_load_failure("demo-1");
        let handle = manager.ensure_loaded("demo-1").await.unwrap();
        assert_eq!(handle.state, ModelState::Loaded);
        assert_eq!(engine.load_calls("demo-1"), 2);
    }

    #[tokio::test]
    async fn unknown_model_is_not_found_and_not_retried_by_the_call() {
        let engine = Arc::new(MockEngine::new());
        let manager = ModelLifecycleManager::new(engine.clone());

        let err = manager.ensure_loaded("ghost").await;
        assert!(matches!(err, Err(GatewayError::ModelNotFound(_))));
        assert_eq!(engine.load_calls("ghost"), 0);
        assert!(!manager.is_loaded("ghost"));
    }

    #[tokio::test]
    async fn list_loaded_preserves_first_load_order() {
        let engine = Arc::new(MockEngine::with_catalog(vec![
            "b".to_string(),
            "a".to_string(),
        ]));
        let manager = ModelLifecycleManager::new(engine);

        manager.ensure_loaded("b").await.unwrap();
        manager.ensure_loaded("a").await.unwrap();
        manager.ensure_loaded("b").await.unwrap();
        assert_eq!(manager.list_loaded(), vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn unload_is_idempotent() {
        let engine = Arc::new(MockEngine::new());
        let manager = ModelLifecycleManager::new(engine);

        // Never loaded: no-op.
        manager.unload("demo-1").await.unwrap();

        manager.ensure_loaded("demo-1").await.unwrap();
        manager.unload("demo-1").await.unwrap();
        assert!(!manager.is_loaded("demo-1"));
        manager.unload("demo-1").await.unwrap();
        assert!(manager.list_loaded().is_empty());
    }

    #[tokio::test]
    async fn unload_all_releases_everything() {
        let engine = Arc::new(MockEngine::new());
        let manager = ModelLifecycleManager::new(engine);

        manager.ensure_loaded("demo-1").await.unwrap();
        manager.ensure_loaded("demo-2").await.unwrap();
        manager.unload_all().await;
        assert!(manager.list_loaded().is_empty());
    }
}
