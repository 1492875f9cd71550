use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;

use multiverse_core::{
    ContextMessage, GenerationEvent, NewNode, Node, Session, SqliteTreeStore, TreeResult,
    TreeStore,
};
use multiverse_llm::{FragmentStream, InferenceError, InferenceProvider, Result};

pub async fn create_store() -> (SqliteTreeStore, TempDir) {
    let dir = tempdir().expect("temp dir");
    let store = SqliteTreeStore::new(dir.path().join("chat.db"));
    store.init().await.expect("init store");
    (store, dir)
}

pub async fn drain_events(mut event_rx: mpsc::Receiver<GenerationEvent>) -> Vec<GenerationEvent> {
    let mut events = Vec::new();
    while let Some(event) = event_rx.recv().await {
        events.push(event);
    }
    events
}

/// Delegates to SQLite and counts content writes.
pub struct CountingStore {
    inner: SqliteTreeStore,
    content_writes: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: SqliteTreeStore) -> Self {
        Self {
            inner,
            content_writes: AtomicUsize::new(0),
        }
    }

    pub fn content_writes(&self) -> usize {
        self.content_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TreeStore for CountingStore {
    async fn init(&self) -> TreeResult<()> {
        self.inner.init().await
    }

    async fn create_session(&self, name: &str) -> TreeResult<String> {
        self.inner.create_session(name).await
    }

    async fn get_session(&self, session_id: &str) -> TreeResult<Option<Session>> {
        self.inner.get_session(session_id).await
    }

    async fn list_sessions(&self) -> TreeResult<Vec<Session>> {
        self.inner.list_sessions().await
    }

    async fn rename_session(&self, session_id: &str, name: &str) -> TreeResult<()> {
        self.inner.rename_session(session_id, name).await
    }

    async fn delete_session(&self, session_id: &str) -> TreeResult<bool> {
        self.inner.delete_session(session_id).await
    }

    async fn create_node(&self, node: NewNode) -> TreeResult<String> {
        self.inner.create_node(node).await
    }

    async fn get_node(&self, node_id: &str) -> TreeResult<Option<Node>> {
        self.inner.get_node(node_id).await
    }

    async fn list_session_nodes(&self, session_id: &str) -> TreeResult<Vec<Node>> {
        self.inner.list_session_nodes(session_id).await
    }

    async fn list_children(&self, node_id: &str) -> TreeResult<Vec<Node>> {
        self.inner.list_children(node_id).await
    }

    async fn list_siblings(&self, node_id: &str) -> TreeResult<Vec<Node>> {
        self.inner.list_siblings(node_id).await
    }

    async fn update_node_content(&self, node_id: &str, content: &str) -> TreeResult<()> {
        self.content_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_node_content(node_id, content).await
    }
}

/// Replies with fixed fragments, optionally failing afterwards, and records
/// every context it was asked to complete.
pub struct ScriptedProvider {
    fragments: Vec<String>,
    fail_with: Option<String>,
    contexts: Mutex<Vec<(Vec<ContextMessage>, String)>>,
}

impl ScriptedProvider {
    pub fn replying(fragments: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_with: None,
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_after(fragments: &[&str], message: &str) -> Arc<Self> {
        Arc::new(Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_with: Some(message.to_string()),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(Vec<ContextMessage>, String)> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn generate(&self, context: &[ContextMessage], model: &str) -> Result<FragmentStream> {
        self.contexts
            .lock()
            .unwrap()
            .push((context.to_vec(), model.to_string()));

        let mut items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.fail_with {
            items.push(Err(InferenceError::Stream(message.clone())));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}
