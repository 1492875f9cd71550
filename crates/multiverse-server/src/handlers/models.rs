use actix_web::{web, HttpResponse, Responder};

use crate::state::AppState;

/// Lists provider models. Provider failures yield an empty list.
pub async fn handler(state: web::Data<AppState>) -> impl Responder {
    let models = match state.provider.list_models().await {
        Ok(models) => models,
        Err(error) => {
            log::warn!("Failed to list models: {}", error);
            Vec::new()
        }
    };

    HttpResponse::Ok().json(serde_json::json!({ "models": models }))
}
