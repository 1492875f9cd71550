pub mod storage;
pub mod traceback;
pub mod tree;

pub use storage::{SqliteTreeStore, TreeStore};
pub use traceback::{ancestors, context_messages};
pub use tree::error::{TreeError, TreeResult};
pub use tree::events::GenerationEvent;
pub use tree::types::{ContextMessage, NewNode, Node, Role, Session, DEFAULT_SESSION_NAME};
