use async_trait::async_trait;
use futures::Stream;
use multiverse_core::ContextMessage;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Generation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, InferenceError>;

/// Lazy, finite, non-restartable sequence of text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Stream a completion for `context`, which is ordered root-first.
    ///
    /// The returned stream may yield an error after zero or more fragments.
    async fn generate(&self, context: &[ContextMessage], model: &str) -> Result<FragmentStream>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![])
    }

    async fn health_check(&self) -> bool {
        true
    }
}
