use actix_web::{web, HttpResponse};

use multiverse_core::{Node, TreeError};

use crate::error::Result;
use crate::state::AppState;

async fn require_node(state: &AppState, node_id: &str) -> Result<Node> {
    let node = state
        .store
        .get_node(node_id)
        .await?
        .ok_or_else(|| TreeError::NodeNotFound(node_id.to_string()))?;
    Ok(node)
}

/// Position of `node_id` among its siblings; 0 if absent.
pub fn sibling_index(siblings: &[Node], node_id: &str) -> usize {
    siblings
        .iter()
        .position(|sibling| sibling.id == node_id)
        .unwrap_or(0)
}

/// `GET /nodes/{id}`
pub async fn get(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let node = require_node(&state, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(node))
}

/// `GET /nodes/{id}/path`
pub async fn path(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let node_id = path.into_inner();
    let nodes = state.branch_manager.ancestors(&node_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "path": nodes })))
}

/// `GET /nodes/{id}/siblings`
pub async fn siblings(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let node_id = path.into_inner();
    require_node(&state, &node_id).await?;

    let siblings = state.store.list_siblings(&node_id).await?;
    let current_index = sibling_index(&siblings, &node_id);
    let total = siblings.len();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "siblings": siblings,
        "current_index": current_index,
        "total": total,
    })))
}

/// `GET /nodes/{id}/children`
pub async fn children(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let node_id = path.into_inner();
    require_node(&state, &node_id).await?;

    let children = state.store.list_children(&node_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "children": children })))
}
