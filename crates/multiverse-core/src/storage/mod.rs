mod sqlite;

pub use sqlite::SqliteTreeStore;

use async_trait::async_trait;

use crate::tree::{NewNode, Node, Session, TreeResult};

/// Persistent record store for sessions and nodes.
///
/// Ordered scans follow the sibling rule: `created_at` ascending, ties broken
/// by insertion order.
#[async_trait]
pub trait TreeStore: Send + Sync {
    async fn init(&self) -> TreeResult<()>;

    async fn create_session(&self, name: &str) -> TreeResult<String>;
    async fn get_session(&self, session_id: &str) -> TreeResult<Option<Session>>;
    /// Most recently updated first.
    async fn list_sessions(&self) -> TreeResult<Vec<Session>>;
    async fn rename_session(&self, session_id: &str, name: &str) -> TreeResult<()>;
    /// Removes the session and all of its nodes. Returns whether the session existed.
    async fn delete_session(&self, session_id: &str) -> TreeResult<bool>;

    /// Fails with `SessionNotFound` for an unknown session and with
    /// `InvalidReference` when the parent is missing or lives in another session.
    async fn create_node(&self, node: NewNode) -> TreeResult<String>;
    async fn get_node(&self, node_id: &str) -> TreeResult<Option<Node>>;
    async fn list_session_nodes(&self, session_id: &str) -> TreeResult<Vec<Node>>;
    async fn list_children(&self, node_id: &str) -> TreeResult<Vec<Node>>;
    /// Nodes sharing this node's parent, itself included. Roots are siblings of
    /// the other roots in their session.
    async fn list_siblings(&self, node_id: &str) -> TreeResult<Vec<Node>>;
    /// Overwrites content without touching the session timestamp.
    async fn update_node_content(&self, node_id: &str, content: &str) -> TreeResult<()>;
}
