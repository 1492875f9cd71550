use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::Result;
use crate::handlers::stream::ndjson_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BranchRequest {
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContinueRequest {
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// `POST /chat/completions`
pub async fn completions(
    state: web::Data<AppState>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let model = state.model_or_default(req.model.as_deref());
    log::info!(
        "[{}] Chat completion under {:?} with model {}",
        req.session_id,
        req.parent_id,
        model
    );

    let generation = state
        .branch_manager
        .extend(&req.session_id, req.parent_id.as_deref(), &req.content, &model)
        .await?;

    Ok(ndjson_response(&state, generation).await)
}

/// `PUT /nodes/{id}/branch`. The body is optional.
pub async fn branch(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: Option<web::Json<BranchRequest>>,
) -> Result<HttpResponse> {
    let node_id = path.into_inner();
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    let model = state.model_or_default(req.model.as_deref());
    log::info!("[{}] Branch requested with model {}", node_id, model);

    let generation = state.branch_manager.fork(&node_id, &model).await?;
    Ok(ndjson_response(&state, generation).await)
}

/// `POST /nodes/{id}/continue`
pub async fn continue_from(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<ContinueRequest>,
) -> Result<HttpResponse> {
    let node_id = path.into_inner();
    let req = req.into_inner();
    let model = state.model_or_default(req.model.as_deref());
    log::info!("[{}] Continue requested with model {}", node_id, model);

    let generation = state
        .branch_manager
        .continue_from(&node_id, &req.content, &model)
        .await?;
    Ok(ndjson_response(&state, generation).await)
}
