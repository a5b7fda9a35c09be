//! Model catalog listing types.

use serde::Serialize;

/// One entry in the model catalog.
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

impl ModelInfo {
    pub fn new(id: String) -> Self {
        Self {
            id,
            object: "model".to_string(),
            created: 0,
            owned_by: "self-hosted".to_string(),
        }
    }
}

/// Catalog listing response.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelsResponse {
    pub fn new(data: Vec<ModelInfo>) -> Self {
        Self {
            object: "list".to_string(),
            data,
        }
    }
}
