use actix_web::{web, HttpResponse, Responder};

use crate::state::AppState;

pub async fn handler(state: web::Data<AppState>) -> impl Responder {
    let ollama = if state.provider.health_check().await {
        "ok"
    } else {
        "unavailable"
    };

    HttpResponse::Ok().json(serde_json::json!({
        "api": "ok",
        "ollama": ollama,
    }))
}
