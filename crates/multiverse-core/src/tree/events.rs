use serde::{Deserialize, Serialize};

/// Progress and terminal notifications for one generation.
///
/// A generation emits zero or more `Token` events followed by exactly one
/// `Complete` or `Error` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    Token {
        node_id: String,
        user_node_id: Option<String>,
        content: String,
    },

    Complete {
        node_id: String,
        user_node_id: Option<String>,
        content: String,
    },

    /// `content` is what was written to the node. When that write failed,
    /// `message` says so.
    Error {
        node_id: String,
        user_node_id: Option<String>,
        message: String,
        content: String,
    },
}

impl GenerationEvent {
    pub fn node_id(&self) -> &str {
        match self {
            Self::Token { node_id, .. }
            | Self::Complete { node_id, .. }
            | Self::Error { node_id, .. } => node_id,
        }
    }

    pub fn user_node_id(&self) -> Option<&str> {
        match self {
            Self::Token { user_node_id, .. }
            | Self::Complete { user_node_id, .. }
            | Self::Error { user_node_id, .. } => user_node_id.as_deref(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token { .. })
    }
}
