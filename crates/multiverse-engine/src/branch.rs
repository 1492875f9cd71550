use std::sync::Arc;

use futures::stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use multiverse_core::{
    ancestors, context_messages, ContextMessage, GenerationEvent, NewNode, Node, Role, TreeError,
    TreeResult, TreeStore,
};
use multiverse_llm::{FragmentStream, InferenceError, InferenceProvider};

use crate::config::EngineConfig;
use crate::stream::aggregator::{GenerationOutcome, GenerationTarget, StreamAggregator};

/// Handle to an in-flight generation.
///
/// Node ids are known before any text is generated. Dropping `events` stops
/// the generation; the node still receives its terminal content.
pub struct Generation {
    pub session_id: String,
    pub user_node_id: Option<String>,
    pub assistant_node_id: String,
    pub events: mpsc::Receiver<GenerationEvent>,
    pub cancel_token: CancellationToken,
    pub handle: JoinHandle<GenerationOutcome>,
}

/// Grows the tree by extending, forking and continuing branches.
pub struct BranchManager {
    store: Arc<dyn TreeStore>,
    provider: Arc<dyn InferenceProvider>,
    config: EngineConfig,
}

impl BranchManager {
    pub fn new(
        store: Arc<dyn TreeStore>,
        provider: Arc<dyn InferenceProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn InferenceProvider> {
        &self.provider
    }

    /// Root-to-node path. Fails with `NodeNotFound` for an unknown node.
    pub async fn ancestors(&self, node_id: &str) -> TreeResult<Vec<Node>> {
        let path = ancestors(self.store.as_ref(), node_id).await?;
        if path.is_empty() {
            return Err(TreeError::NodeNotFound(node_id.to_string()));
        }
        Ok(path)
    }

    /// Normal chat turn: a user node under `parent_id` (or a new root) and an
    /// assistant reply under it.
    pub async fn extend(
        &self,
        session_id: &str,
        parent_id: Option<&str>,
        content: &str,
        model: &str,
    ) -> TreeResult<Generation> {
        let user_node_id = self
            .store
            .create_node(NewNode::user(
                session_id,
                parent_id.map(str::to_string),
                content,
            ))
            .await?;
        log::debug!("[{}] User node {} created", session_id, user_node_id);

        let path = ancestors(self.store.as_ref(), &user_node_id).await?;
        let assistant_node_id = self
            .store
            .create_node(NewNode::assistant(
                session_id,
                Some(user_node_id.clone()),
                model,
            ))
            .await?;

        Ok(self.spawn_generation(
            session_id.to_string(),
            GenerationTarget {
                node_id: assistant_node_id,
                user_node_id: Some(user_node_id),
            },
            context_messages(&path),
            model,
        ))
    }

    /// Regenerate: a new assistant sibling of `node_id`, answering the same
    /// context. The original node is left untouched.
    pub async fn fork(&self, node_id: &str, model: &str) -> TreeResult<Generation> {
        let node = self
            .store
            .get_node(node_id)
            .await?
            .ok_or_else(|| TreeError::NodeNotFound(node_id.to_string()))?;

        let context = match node.parent_id.as_deref() {
            Some(parent_id) => context_messages(&ancestors(self.store.as_ref(), parent_id).await?),
            None => Vec::new(),
        };

        let sibling_id = self
            .store
            .create_node(NewNode::assistant(
                &node.session_id,
                node.parent_id.clone(),
                model,
            ))
            .await?;
        log::info!("[{}] Forked node {} into {}", node.session_id, node_id, sibling_id);

        Ok(self.spawn_generation(
            node.session_id,
            GenerationTarget {
                node_id: sibling_id,
                user_node_id: None,
            },
            context,
            model,
        ))
    }

    /// Graft a new exchange onto any node, leaf or interior.
    pub async fn continue_from(
        &self,
        parent_id: &str,
        content: &str,
        model: &str,
    ) -> TreeResult<Generation> {
        let parent = self
            .store
            .get_node(parent_id)
            .await?
            .ok_or_else(|| TreeError::NodeNotFound(parent_id.to_string()))?;

        self.extend(&parent.session_id, Some(parent.id.as_str()), content, model)
            .await
    }

    fn spawn_generation(
        &self,
        session_id: String,
        target: GenerationTarget,
        context: Vec<ContextMessage>,
        model: &str,
    ) -> Generation {
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let cancel_token = CancellationToken::new();
        let context = self.with_system_prompt(context);
        let provider = self.provider.clone();
        let aggregator = StreamAggregator::new(self.store.clone(), target.clone());
        let model = model.to_string();
        let token = cancel_token.clone();
        let node_id = target.node_id.clone();

        log::info!(
            "[{}] Starting generation for node {} with model {} ({} context messages)",
            session_id,
            node_id,
            model,
            context.len()
        );

        let handle = tokio::spawn(async move {
            let fragments = tokio::select! {
                biased;
                _ = token.cancelled() => failed_stream(InferenceError::Cancelled),
                result = provider.generate(&context, &model) => match result {
                    Ok(fragments) => fragments,
                    Err(error) => {
                        log::warn!("[{}] Inference request failed: {}", node_id, error);
                        failed_stream(error)
                    }
                },
            };

            aggregator.run(fragments, event_tx, token).await
        });

        Generation {
            session_id,
            user_node_id: target.user_node_id,
            assistant_node_id: target.node_id,
            events: event_rx,
            cancel_token,
            handle,
        }
    }

    fn with_system_prompt(&self, mut context: Vec<ContextMessage>) -> Vec<ContextMessage> {
        let Some(prompt) = self
            .config
            .system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
        else {
            return context;
        };

        if context
            .first()
            .map_or(true, |message| message.role != Role::System)
        {
            context.insert(
                0,
                ContextMessage {
                    role: Role::System,
                    content: prompt.to_string(),
                },
            );
        }
        context
    }
}

fn failed_stream(error: InferenceError) -> FragmentStream {
    Box::pin(stream::once(async move { Err(error) }))
}
