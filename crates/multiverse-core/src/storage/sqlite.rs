use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use super::TreeStore;
use crate::tree::{NewNode, Node, Role, Session, TreeError, TreeResult};

const NODE_COLUMNS: &str =
    "id, session_id, parent_id, role, content, created_at, model, is_active";

#[derive(Debug, Clone)]
pub struct SqliteTreeStore {
    db_path: PathBuf,
}

impl SqliteTreeStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_connection<T, F>(&self, func: F) -> TreeResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> TreeResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&db_path)?;
            func(&mut connection)
        })
        .await
        .map_err(|error| TreeError::Task(error.to_string()))?
    }
}

#[async_trait]
impl TreeStore for SqliteTreeStore {
    async fn init(&self) -> TreeResult<()> {
        self.with_connection(|connection| {
            // seq gives siblings a stable order when created_at collides.
            connection.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS nodes (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    session_id TEXT NOT NULL,
                    parent_id TEXT,
                    role TEXT NOT NULL CHECK(role IN ('user', 'assistant', 'system')),
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    model TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE,
                    FOREIGN KEY(parent_id) REFERENCES nodes(id) DEFERRABLE INITIALLY DEFERRED
                );

                CREATE INDEX IF NOT EXISTS idx_nodes_session ON nodes(session_id);
                CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);
                CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at);
                "#,
            )?;
            Ok(())
        })
        .await
    }

    async fn create_session(&self, name: &str) -> TreeResult<String> {
        let session_id = Uuid::new_v4().to_string();
        let name = name.to_string();
        let now = format_timestamp(Utc::now());

        let id = session_id.clone();
        self.with_connection(move |connection| {
            connection.execute(
                "INSERT INTO sessions (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![id, name, now],
            )?;
            Ok(())
        })
        .await?;

        log::debug!("[{}] Session created", session_id);
        Ok(session_id)
    }

    async fn get_session(&self, session_id: &str) -> TreeResult<Option<Session>> {
        let session_id = session_id.to_string();

        self.with_connection(move |connection| {
            let mut stmt = connection.prepare(
                "SELECT id, name, created_at, updated_at FROM sessions WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(read_session(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_sessions(&self) -> TreeResult<Vec<Session>> {
        self.with_connection(|connection| {
            let mut stmt = connection.prepare(
                "SELECT id, name, created_at, updated_at FROM sessions ORDER BY updated_at DESC, rowid DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();

            while let Some(row) = rows.next()? {
                sessions.push(read_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    async fn rename_session(&self, session_id: &str, name: &str) -> TreeResult<()> {
        let session_id = session_id.to_string();
        let name = name.to_string();
        let now = format_timestamp(Utc::now());

        self.with_connection(move |connection| {
            let updated = connection.execute(
                "UPDATE sessions SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, session_id],
            )?;
            if updated == 0 {
                return Err(TreeError::SessionNotFound(session_id));
            }
            Ok(())
        })
        .await
    }

    async fn delete_session(&self, session_id: &str) -> TreeResult<bool> {
        let session_id = session_id.to_string();

        self.with_connection(move |connection| {
            let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let nodes_deleted =
                tx.execute("DELETE FROM nodes WHERE session_id = ?1", params![session_id])?;
            let sessions_deleted =
                tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
            tx.commit()?;

            log::debug!(
                "[{}] Deleted session ({} rows) with {} nodes",
                session_id,
                sessions_deleted,
                nodes_deleted
            );
            Ok(sessions_deleted > 0)
        })
        .await
    }

    async fn create_node(&self, node: NewNode) -> TreeResult<String> {
        let node_id = Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());

        let id = node_id.clone();
        self.with_connection(move |connection| {
            // Deferred read-then-write upgrades fail with SQLITE_BUSY without waiting.
            let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let session_exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
                params![node.session_id],
                |row| row.get(0),
            )?;
            if !session_exists {
                return Err(TreeError::SessionNotFound(node.session_id));
            }

            if let Some(parent_id) = node.parent_id.as_deref() {
                let parent_session: Option<String> = tx
                    .query_row(
                        "SELECT session_id FROM nodes WHERE id = ?1",
                        params![parent_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                match parent_session {
                    None => {
                        return Err(TreeError::InvalidReference(format!(
                            "parent node {} does not exist",
                            parent_id
                        )));
                    }
                    Some(parent_session) if parent_session != node.session_id => {
                        return Err(TreeError::InvalidReference(format!(
                            "parent node {} belongs to session {}, not {}",
                            parent_id, parent_session, node.session_id
                        )));
                    }
                    Some(_) => {}
                }
            }

            tx.execute(
                r#"
                INSERT INTO nodes (id, session_id, parent_id, role, content, created_at, model, is_active)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
                "#,
                params![
                    id,
                    node.session_id,
                    node.parent_id,
                    node.role.as_str(),
                    node.content,
                    now,
                    node.model,
                ],
            )?;
            tx.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                params![now, node.session_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        Ok(node_id)
    }

    async fn get_node(&self, node_id: &str) -> TreeResult<Option<Node>> {
        let node_id = node_id.to_string();

        self.with_connection(move |connection| {
            let sql = format!("SELECT {} FROM nodes WHERE id = ?1", NODE_COLUMNS);
            let mut stmt = connection.prepare(&sql)?;
            let mut rows = stmt.query(params![node_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(read_node(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_session_nodes(&self, session_id: &str) -> TreeResult<Vec<Node>> {
        let session_id = session_id.to_string();

        self.with_connection(move |connection| {
            let sql = format!(
                "SELECT {} FROM nodes WHERE session_id = ?1 ORDER BY created_at ASC, seq ASC",
                NODE_COLUMNS
            );
            query_nodes(connection, &sql, &session_id)
        })
        .await
    }

    async fn list_children(&self, node_id: &str) -> TreeResult<Vec<Node>> {
        let node_id = node_id.to_string();

        self.with_connection(move |connection| {
            let sql = format!(
                "SELECT {} FROM nodes WHERE parent_id = ?1 ORDER BY created_at ASC, seq ASC",
                NODE_COLUMNS
            );
            query_nodes(connection, &sql, &node_id)
        })
        .await
    }

    async fn list_siblings(&self, node_id: &str) -> TreeResult<Vec<Node>> {
        let Some(node) = self.get_node(node_id).await? else {
            return Ok(Vec::new());
        };

        match node.parent_id {
            Some(parent_id) => self.list_children(&parent_id).await,
            None => {
                let session_id = node.session_id;
                self.with_connection(move |connection| {
                    let sql = format!(
                        "SELECT {} FROM nodes WHERE session_id = ?1 AND parent_id IS NULL ORDER BY created_at ASC, seq ASC",
                        NODE_COLUMNS
                    );
                    query_nodes(connection, &sql, &session_id)
                })
                .await
            }
        }
    }

    async fn update_node_content(&self, node_id: &str, content: &str) -> TreeResult<()> {
        let node_id = node_id.to_string();
        let content = content.to_string();

        self.with_connection(move |connection| {
            let updated = connection.execute(
                "UPDATE nodes SET content = ?1 WHERE id = ?2",
                params![content, node_id],
            )?;
            if updated == 0 {
                return Err(TreeError::NodeNotFound(node_id));
            }
            Ok(())
        })
        .await
    }
}

fn open_connection(path: &Path) -> TreeResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let connection = Connection::open(path)?;
    connection.execute_batch(
        r#"
        PRAGMA busy_timeout = 5000;
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

/// Fixed-width UTC so lexical order in SQL matches chronological order.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: String) -> TreeResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
}

fn query_nodes(connection: &Connection, sql: &str, key: &str) -> TreeResult<Vec<Node>> {
    let mut stmt = connection.prepare(sql)?;
    let mut rows = stmt.query(params![key])?;
    let mut nodes = Vec::new();

    while let Some(row) = rows.next()? {
        nodes.push(read_node(row)?);
    }

    Ok(nodes)
}

fn read_session(row: &Row<'_>) -> TreeResult<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_timestamp(row.get::<_, String>(2)?)?,
        updated_at: parse_timestamp(row.get::<_, String>(3)?)?,
    })
}

fn read_node(row: &Row<'_>) -> TreeResult<Node> {
    let role_raw: String = row.get(3)?;
    let role = Role::from_db(&role_raw)
        .ok_or_else(|| TreeError::InvalidData(format!("unknown node role: {}", role_raw)))?;

    Ok(Node {
        id: row.get(0)?,
        session_id: row.get(1)?,
        parent_id: row.get(2)?,
        role,
        content: row.get(4)?,
        created_at: parse_timestamp(row.get::<_, String>(5)?)?,
        model: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::{tempdir, TempDir};

    use super::*;

    async fn create_store() -> (SqliteTreeStore, TempDir) {
        let dir = tempdir().expect("temp dir");
        let store = SqliteTreeStore::new(dir.path().join("chat.db"));
        store.init().await.expect("init store");
        (store, dir)
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let (store, _dir) = create_store().await;
        store.init().await.expect("second init");
    }

    #[tokio::test]
    async fn create_and_get_session() {
        let (store, _dir) = create_store().await;

        let session_id = store.create_session("S1").await.expect("create session");
        let session = store
            .get_session(&session_id)
            .await
            .expect("get session")
            .expect("session exists");

        assert_eq!(session.id, session_id);
        assert_eq!(session.name, "S1");
        assert_eq!(session.created_at, session.updated_at);
        assert!(store.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_sessions_puts_most_recently_updated_first() {
        let (store, _dir) = create_store().await;
        let first = store.create_session("first").await.unwrap();
        let second = store.create_session("second").await.unwrap();

        let ids: Vec<String> = store
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|session| session.id)
            .collect();
        assert_eq!(ids, vec![second.clone(), first.clone()]);

        store
            .create_node(NewNode::user(&first, None, "hello"))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|session| session.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn rename_session_updates_name_and_reports_missing() {
        let (store, _dir) = create_store().await;
        let session_id = store.create_session("New Chat").await.unwrap();

        store.rename_session(&session_id, "Renamed").await.unwrap();
        let session = store.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(session.name, "Renamed");
        assert!(session.updated_at >= session.created_at);

        let error = store.rename_session("missing", "x").await.unwrap_err();
        assert!(matches!(error, TreeError::SessionNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn create_node_bumps_session_updated_at() {
        let (store, _dir) = create_store().await;
        let session_id = store.create_session("S1").await.unwrap();
        let before = store.get_session(&session_id).await.unwrap().unwrap();

        let node_id = store
            .create_node(NewNode::user(&session_id, None, "Hi"))
            .await
            .unwrap();
        let node = store.get_node(&node_id).await.unwrap().unwrap();
        let after = store.get_session(&session_id).await.unwrap().unwrap();

        assert_eq!(node.role, Role::User);
        assert_eq!(node.content, "Hi");
        assert!(node.parent_id.is_none());
        assert!(node.model.is_none());
        assert!(node.is_active);
        assert_eq!(after.updated_at, node.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn create_node_rejects_unknown_session() {
        let (store, _dir) = create_store().await;

        let error = store
            .create_node(NewNode::user("missing", None, "Hi"))
            .await
            .unwrap_err();

        assert!(matches!(error, TreeError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn create_node_rejects_missing_or_foreign_parent() {
        let (store, _dir) = create_store().await;
        let s1 = store.create_session("S1").await.unwrap();
        let s2 = store.create_session("S2").await.unwrap();
        let foreign = store
            .create_node(NewNode::user(&s2, None, "elsewhere"))
            .await
            .unwrap();

        let missing = store
            .create_node(NewNode::user(&s1, Some("nope".to_string()), "Hi"))
            .await
            .unwrap_err();
        assert!(matches!(missing, TreeError::InvalidReference(_)));

        let cross = store
            .create_node(NewNode::user(&s1, Some(foreign), "Hi"))
            .await
            .unwrap_err();
        assert!(matches!(cross, TreeError::InvalidReference(_)));

        assert!(store.list_session_nodes(&s1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn children_follow_insertion_order() {
        let (store, _dir) = create_store().await;
        let session_id = store.create_session("S1").await.unwrap();
        let root = store
            .create_node(NewNode::user(&session_id, None, "root"))
            .await
            .unwrap();

        let mut expected = Vec::new();
        for _ in 0..5 {
            expected.push(
                store
                    .create_node(NewNode::assistant(&session_id, Some(root.clone()), "m"))
                    .await
                    .unwrap(),
            );
        }

        let children: Vec<String> = store
            .list_children(&root)
            .await
            .unwrap()
            .into_iter()
            .map(|node| node.id)
            .collect();
        assert_eq!(children, expected);
        assert!(store.list_children(&expected[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn siblings_of_roots_are_other_roots_in_session() {
        let (store, _dir) = create_store().await;
        let session_id = store.create_session("S1").await.unwrap();
        let other_session = store.create_session("S2").await.unwrap();

        let r1 = store
            .create_node(NewNode::user(&session_id, None, "one"))
            .await
            .unwrap();
        let r2 = store
            .create_node(NewNode::user(&session_id, None, "two"))
            .await
            .unwrap();
        store
            .create_node(NewNode::user(&other_session, None, "other"))
            .await
            .unwrap();
        let child = store
            .create_node(NewNode::assistant(&session_id, Some(r1.clone()), "m"))
            .await
            .unwrap();

        let roots: Vec<String> = store
            .list_siblings(&r2)
            .await
            .unwrap()
            .into_iter()
            .map(|node| node.id)
            .collect();
        assert_eq!(roots, vec![r1, r2]);

        let child_siblings = store.list_siblings(&child).await.unwrap();
        assert_eq!(child_siblings.len(), 1);
        assert_eq!(child_siblings[0].id, child);

        assert!(store.list_siblings("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_node_content_leaves_session_timestamp_alone() {
        let (store, _dir) = create_store().await;
        let session_id = store.create_session("S1").await.unwrap();
        let node_id = store
            .create_node(NewNode::assistant(&session_id, None, "gemma3:4b"))
            .await
            .unwrap();
        let before = store.get_session(&session_id).await.unwrap().unwrap();

        store
            .update_node_content(&node_id, "generated text")
            .await
            .unwrap();

        let node = store.get_node(&node_id).await.unwrap().unwrap();
        let after = store.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(node.content, "generated text");
        assert_eq!(after.updated_at, before.updated_at);

        let error = store.update_node_content("missing", "x").await.unwrap_err();
        assert!(matches!(error, TreeError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn delete_session_cascades_to_nodes() {
        let (store, _dir) = create_store().await;
        let session_id = store.create_session("S1").await.unwrap();
        let keep = store.create_session("keep").await.unwrap();
        let root = store
            .create_node(NewNode::user(&session_id, None, "Hi"))
            .await
            .unwrap();
        let child = store
            .create_node(NewNode::assistant(&session_id, Some(root.clone()), "m"))
            .await
            .unwrap();
        let kept_node = store
            .create_node(NewNode::user(&keep, None, "still here"))
            .await
            .unwrap();

        assert!(store.delete_session(&session_id).await.unwrap());

        assert!(store.get_session(&session_id).await.unwrap().is_none());
        assert!(store.get_node(&root).await.unwrap().is_none());
        assert!(store.get_node(&child).await.unwrap().is_none());
        assert!(store.get_node(&kept_node).await.unwrap().is_some());
        assert!(!store.delete_session(&session_id).await.unwrap());
    }

    #[tokio::test]
    async fn session_nodes_are_chronological() {
        let (store, _dir) = create_store().await;
        let session_id = store.create_session("S1").await.unwrap();
        let u1 = store
            .create_node(NewNode::user(&session_id, None, "Hi"))
            .await
            .unwrap();
        let a1 = store
            .create_node(NewNode::assistant(&session_id, Some(u1.clone()), "m"))
            .await
            .unwrap();
        let s1 = store
            .create_node(NewNode::system(&session_id, None, "be brief"))
            .await
            .unwrap();

        let nodes = store.list_session_nodes(&session_id).await.unwrap();
        let ids: Vec<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec![u1.as_str(), a1.as_str(), s1.as_str()]);
        assert_eq!(nodes[2].role, Role::System);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_node_creation_across_sessions() {
        let (store, _dir) = create_store().await;
        let mut session_ids = Vec::new();
        for index in 0..8 {
            session_ids.push(store.create_session(&format!("S{}", index)).await.unwrap());
        }

        let mut handles = Vec::new();
        for index in 0..200 {
            let store = store.clone();
            let session_id = session_ids[index % session_ids.len()].clone();
            handles.push(tokio::spawn(async move {
                store
                    .create_node(NewNode::user(&session_id, None, &format!("message {}", index)))
                    .await
            }));
        }

        let mut failures = Vec::new();
        for handle in handles {
            if let Err(error) = handle.await.unwrap() {
                failures.push(error.to_string());
            }
        }
        assert!(failures.is_empty(), "{} writes failed: {:?}", failures.len(), failures.first());

        let mut total = 0;
        for session_id in &session_ids {
            total += store.list_session_nodes(session_id).await.unwrap().len();
        }
        assert_eq!(total, 200);
    }

    #[tokio::test]
    async fn identical_timestamps_fall_back_to_insertion_order() {
        let (store, _dir) = create_store().await;
        let session_id = store.create_session("S1").await.unwrap();
        let stamp = format_timestamp(Utc::now());

        let sid = session_id.clone();
        store
            .with_connection(move |connection| {
                let rows = [
                    ("root-z", None, "user"),
                    ("root-a", None, "user"),
                    ("child-m", Some("root-z"), "assistant"),
                    ("child-b", Some("root-z"), "assistant"),
                    ("child-k", Some("root-z"), "assistant"),
                ];
                for (id, parent_id, role) in rows {
                    connection.execute(
                        "INSERT INTO nodes (id, session_id, parent_id, role, content, created_at, model, is_active)
                         VALUES (?1, ?2, ?3, ?4, '', ?5, NULL, 1)",
                        params![id, sid, parent_id, role, stamp],
                    )?;
                }
                Ok(())
            })
            .await
            .unwrap();

        fn ids(nodes: &[Node]) -> Vec<&str> {
            nodes.iter().map(|node| node.id.as_str()).collect()
        }

        let children = store.list_children("root-z").await.unwrap();
        assert_eq!(ids(&children), vec!["child-m", "child-b", "child-k"]);

        let siblings = store.list_siblings("child-k").await.unwrap();
        assert_eq!(ids(&siblings), vec!["child-m", "child-b", "child-k"]);

        let roots = store.list_siblings("root-a").await.unwrap();
        assert_eq!(ids(&roots), vec!["root-z", "root-a"]);

        let nodes = store.list_session_nodes(&session_id).await.unwrap();
        assert_eq!(
            ids(&nodes),
            vec!["root-z", "root-a", "child-m", "child-b", "child-k"]
        );
    }
}
