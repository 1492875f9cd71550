use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_NAME: &str = "New Chat";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// A named container for one conversation tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One message in a session's tree. Only `content` changes after insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    pub session_id: String,
    pub parent_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub model: Option<String>,
    pub is_active: bool,
}

/// Insert request for [`crate::TreeStore::create_node`].
#[derive(Debug, Clone)]
pub struct NewNode {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub parent_id: Option<String>,
    pub model: Option<String>,
}

impl NewNode {
    pub fn user(
        session_id: impl Into<String>,
        parent_id: Option<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role: Role::User,
            content: content.into(),
            parent_id,
            model: None,
        }
    }

    /// Assistant placeholder, filled in once generation finishes.
    pub fn assistant(
        session_id: impl Into<String>,
        parent_id: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role: Role::Assistant,
            content: String::new(),
            parent_id,
            model: Some(model.into()),
        }
    }

    pub fn system(
        session_id: impl Into<String>,
        parent_id: Option<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role: Role::System,
            content: content.into(),
            parent_id,
            model: None,
        }
    }
}

/// Role/content pair handed to the inference capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Node> for ContextMessage {
    fn from(node: &Node) -> Self {
        Self {
            role: node.role,
            content: node.content.clone(),
        }
    }
}
