use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use multiverse_core::{GenerationEvent, TreeStore};
use multiverse_llm::{FragmentStream, InferenceError};

/// The node a generation writes to.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTarget {
    pub node_id: String,
    /// Set when the generation answers a freshly created user node.
    pub user_node_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub node_id: String,
    /// Content handed to the store in the terminal write.
    pub content: String,
    pub fragment_count: usize,
    pub error: Option<String>,
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Content persisted for a failed generation. The bare error message when
/// nothing arrived, otherwise the partial text with the error appended.
pub fn failure_content(partial: &str, message: &str) -> String {
    if partial.is_empty() {
        message.to_string()
    } else {
        format!("{}\n\n[{}]", partial, message)
    }
}

/// Drives one generation: relays fragments as events, then writes the
/// node's content exactly once.
pub struct StreamAggregator {
    store: Arc<dyn TreeStore>,
    target: GenerationTarget,
}

impl StreamAggregator {
    pub fn new(store: Arc<dyn TreeStore>, target: GenerationTarget) -> Self {
        Self { store, target }
    }

    pub fn target(&self) -> &GenerationTarget {
        &self.target
    }

    pub async fn run(
        self,
        mut fragments: FragmentStream,
        event_tx: mpsc::Sender<GenerationEvent>,
        cancel_token: CancellationToken,
    ) -> GenerationOutcome {
        let node_id = self.target.node_id.clone();
        let mut buffer = String::new();
        let mut fragment_count = 0usize;

        let failure = loop {
            let next = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    log::info!("[{}] Generation cancelled", node_id);
                    break Some(InferenceError::Cancelled.to_string());
                }
                _ = event_tx.closed() => {
                    log::info!("[{}] Event consumer went away, stopping generation", node_id);
                    break Some("Client disconnected".to_string());
                }
                next = fragments.next() => next,
            };

            match next {
                Some(Ok(fragment)) => {
                    buffer.push_str(&fragment);
                    fragment_count += 1;

                    let event = GenerationEvent::Token {
                        node_id: node_id.clone(),
                        user_node_id: self.target.user_node_id.clone(),
                        content: fragment,
                    };
                    if event_tx.send(event).await.is_err() {
                        log::info!("[{}] Event consumer went away, stopping generation", node_id);
                        break Some("Client disconnected".to_string());
                    }
                }
                Some(Err(error)) => {
                    log::warn!(
                        "[{}] Generation failed after {} fragments: {}",
                        node_id,
                        fragment_count,
                        error
                    );
                    break Some(error.to_string());
                }
                None => break None,
            }
        };

        let (terminal, outcome) = match failure {
            None => self.finish(buffer, fragment_count).await,
            Some(description) => self.fail(buffer, fragment_count, &description).await,
        };

        let _ = event_tx.send(terminal).await;
        outcome
    }

    async fn finish(
        &self,
        content: String,
        fragment_count: usize,
    ) -> (GenerationEvent, GenerationOutcome) {
        let node_id = self.target.node_id.clone();

        match self.store.update_node_content(&node_id, &content).await {
            Ok(()) => {
                log::info!(
                    "[{}] Generation complete: {} fragments, {} chars",
                    node_id,
                    fragment_count,
                    content.len()
                );
                let event = GenerationEvent::Complete {
                    node_id: node_id.clone(),
                    user_node_id: self.target.user_node_id.clone(),
                    content: content.clone(),
                };
                let outcome = GenerationOutcome {
                    node_id,
                    content,
                    fragment_count,
                    error: None,
                };
                (event, outcome)
            }
            Err(error) => {
                log::error!("[{}] Failed to persist generated content: {}", node_id, error);
                let message = format!("Error: failed to persist generated content: {}", error);
                let event = GenerationEvent::Error {
                    node_id: node_id.clone(),
                    user_node_id: self.target.user_node_id.clone(),
                    message: message.clone(),
                    content: content.clone(),
                };
                let outcome = GenerationOutcome {
                    node_id,
                    content,
                    fragment_count,
                    error: Some(message),
                };
                (event, outcome)
            }
        }
    }

    async fn fail(
        &self,
        partial: String,
        fragment_count: usize,
        description: &str,
    ) -> (GenerationEvent, GenerationOutcome) {
        let node_id = self.target.node_id.clone();
        let mut message = format!("Error: {}", description);
        let content = failure_content(&partial, &message);

        if let Err(error) = self.store.update_node_content(&node_id, &content).await {
            log::error!("[{}] Failed to persist error content: {}", node_id, error);
            message = format!("{} (failed to persist error content: {})", message, error);
        }

        let event = GenerationEvent::Error {
            node_id: node_id.clone(),
            user_node_id: self.target.user_node_id.clone(),
            message: message.clone(),
            content: content.clone(),
        };
        let outcome = GenerationOutcome {
            node_id,
            content,
            fragment_count,
            error: Some(message),
        };
        (event, outcome)
    }
}
