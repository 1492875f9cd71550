use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use multiverse_core::{SqliteTreeStore, TreeResult, TreeStore};
use multiverse_engine::{BranchManager, EngineConfig};
use multiverse_llm::{InferenceProvider, OllamaProvider};

use crate::config::ServerConfig;

struct ActiveGeneration {
    session_id: String,
    cancel_token: CancellationToken,
}

/// Cancel tokens of in-flight generations, keyed by assistant node id.
#[derive(Default)]
pub struct GenerationRegistry {
    active: RwLock<HashMap<String, ActiveGeneration>>,
}

impl GenerationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session_id: &str, node_id: &str, cancel_token: CancellationToken) {
        let mut active = self.active.write().await;
        active.insert(
            node_id.to_string(),
            ActiveGeneration {
                session_id: session_id.to_string(),
                cancel_token,
            },
        );
    }

    pub async fn remove(&self, node_id: &str) {
        let mut active = self.active.write().await;
        active.remove(node_id);
    }

    /// Cancels the generation writing to `node_id`. False when none is running.
    pub async fn cancel_node(&self, node_id: &str) -> bool {
        let mut active = self.active.write().await;
        match active.remove(node_id) {
            Some(generation) => {
                generation.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every generation in the session, returning how many were stopped.
    pub async fn cancel_session(&self, session_id: &str) -> usize {
        let mut active = self.active.write().await;
        let node_ids: Vec<String> = active
            .iter()
            .filter(|(_, generation)| generation.session_id == session_id)
            .map(|(node_id, _)| node_id.clone())
            .collect();

        for node_id in &node_ids {
            if let Some(generation) = active.remove(node_id) {
                generation.cancel_token.cancel();
            }
        }
        node_ids.len()
    }

    pub async fn is_active(&self, node_id: &str) -> bool {
        self.active.read().await.contains_key(node_id)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TreeStore>,
    pub provider: Arc<dyn InferenceProvider>,
    pub branch_manager: Arc<BranchManager>,
    pub generations: Arc<GenerationRegistry>,
    pub default_model: String,
}

impl AppState {
    /// Opens the SQLite store at the configured path and connects to Ollama.
    pub async fn from_config(config: &ServerConfig) -> TreeResult<Self> {
        log::info!("Initializing tree store at: {:?}", config.db_path);
        let store = SqliteTreeStore::new(&config.db_path);
        store.init().await?;
        log::info!("Tree store initialized at: {:?}", config.db_path);

        log::info!("Using Ollama at {}", config.ollama_url);
        let provider = OllamaProvider::new().with_base_url(config.ollama_url.clone());

        Ok(Self::new(
            Arc::new(store),
            Arc::new(provider),
            EngineConfig {
                system_prompt: config.system_prompt.clone(),
                ..Default::default()
            },
            config.default_model.clone(),
        ))
    }

    pub fn new(
        store: Arc<dyn TreeStore>,
        provider: Arc<dyn InferenceProvider>,
        engine_config: EngineConfig,
        default_model: impl Into<String>,
    ) -> Self {
        let branch_manager = Arc::new(BranchManager::new(
            store.clone(),
            provider.clone(),
            engine_config,
        ));

        Self {
            store,
            provider,
            branch_manager,
            generations: Arc::new(GenerationRegistry::new()),
            default_model: default_model.into(),
        }
    }

    /// The requested model, or the configured default when absent or blank.
    pub fn model_or_default(&self, model: Option<&str>) -> String {
        model
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(&self.default_model)
            .to_string()
    }
}
