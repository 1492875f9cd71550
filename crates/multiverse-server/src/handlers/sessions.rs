use actix_web::{web, HttpResponse};
use serde::Deserialize;

use multiverse_core::{TreeError, DEFAULT_SESSION_NAME};

use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub name: String,
}

/// `POST /sessions`
pub async fn create(
    state: web::Data<AppState>,
    req: Option<web::Json<CreateSessionRequest>>,
) -> Result<HttpResponse> {
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_SESSION_NAME);

    let session_id = state.store.create_session(name).await?;
    let session = state
        .store
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::Internal("Created session vanished".to_string()))?;

    log::info!("[{}] Session created: {}", session_id, session.name);
    Ok(HttpResponse::Ok().json(session))
}

/// `GET /sessions`
pub async fn list(state: web::Data<AppState>) -> Result<HttpResponse> {
    let sessions = state.store.list_sessions().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "sessions": sessions })))
}

/// `GET /sessions/{id}`
pub async fn get(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    let session = state
        .store
        .get_session(&session_id)
        .await?
        .ok_or(TreeError::SessionNotFound(session_id))?;
    Ok(HttpResponse::Ok().json(session))
}

/// `PATCH /sessions/{id}`
pub async fn rename(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<RenameSessionRequest>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    state.store.rename_session(&session_id, &req.name).await?;

    let session = state
        .store
        .get_session(&session_id)
        .await?
        .ok_or(TreeError::SessionNotFound(session_id))?;
    log::info!("[{}] Session renamed to {}", session.id, session.name);
    Ok(HttpResponse::Ok().json(session))
}

/// `DELETE /sessions/{id}`. Stops the session's generations before removing it.
pub async fn delete(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let session_id = path.into_inner();

    let cancelled = state.generations.cancel_session(&session_id).await;
    let deleted = state.store.delete_session(&session_id).await?;

    if !deleted {
        return Err(TreeError::SessionNotFound(session_id).into());
    }

    log::info!(
        "[{}] Session deleted (cancelled {} generations)",
        session_id,
        cancelled
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "deleted" })))
}

/// `GET /sessions/{id}/tree`: every node of the session, chronologically.
pub async fn tree(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    if state.store.get_session(&session_id).await?.is_none() {
        return Err(TreeError::SessionNotFound(session_id).into());
    }

    let nodes = state.store.list_session_nodes(&session_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "session_id": session_id,
        "nodes": nodes,
    })))
}
