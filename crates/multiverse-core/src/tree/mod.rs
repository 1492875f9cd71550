pub mod error;
pub mod events;
pub mod types;

pub use error::{TreeError, TreeResult};
pub use events::GenerationEvent;
pub use types::{ContextMessage, NewNode, Node, Role, Session};
