//! Root-to-node path reconstruction.
//!
//! The path returned by [`ancestors`] is the exact linear context an
//! inference call sees for a node. Sibling branches never appear in it
//! because only the node's own parent chain is followed.

use std::collections::HashSet;

use crate::storage::TreeStore;
use crate::tree::{ContextMessage, Node, TreeResult};

/// Walks parent references from `node_id` and returns the path root-first,
/// ending with the node itself.
///
/// A missing node ends the walk silently, so an unknown `node_id` yields an
/// empty path. Storage errors propagate.
pub async fn ancestors(store: &dyn TreeStore, node_id: &str) -> TreeResult<Vec<Node>> {
    let mut path = Vec::new();
    let mut visited = HashSet::new();
    let mut cursor = Some(node_id.to_string());

    while let Some(current_id) = cursor.take() {
        if !visited.insert(current_id.clone()) {
            log::warn!("[{}] Parent cycle detected during traceback", current_id);
            break;
        }

        match store.get_node(&current_id).await? {
            Some(node) => {
                cursor = node.parent_id.clone();
                path.push(node);
            }
            None => {
                if !path.is_empty() {
                    log::warn!("[{}] Traceback stopped at missing parent", current_id);
                }
                break;
            }
        }
    }

    path.reverse();
    Ok(path)
}

pub fn context_messages(path: &[Node]) -> Vec<ContextMessage> {
    path.iter().map(ContextMessage::from).collect()
}
