use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct StopResponse {
    success: bool,
    message: String,
}

/// `POST /nodes/{id}/stop`
pub async fn handler(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let node_id = path.into_inner();
    log::info!("[{}] Stop request received", node_id);

    if state.generations.cancel_node(&node_id).await {
        log::info!("[{}] Generation cancellation triggered", node_id);
        HttpResponse::Ok().json(StopResponse {
            success: true,
            message: "Generation stopped".to_string(),
        })
    } else {
        log::warn!("[{}] No active generation found", node_id);
        HttpResponse::NotFound().json(StopResponse {
            success: false,
            message: "No active generation found".to_string(),
        })
    }
}
