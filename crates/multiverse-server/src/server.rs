use std::io;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::AppState;

/// Routes under `/api/v1`, also served unprefixed alongside the singular
/// `/session/...` and `/node/...` paths of the pre-versioned API.
pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/v1").configure(api_routes))
        .configure(api_routes)
        .configure(legacy_routes);
}

fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health::handler))
        .route("/models", web::get().to(handlers::models::handler))
        .route("/sessions", web::post().to(handlers::sessions::create))
        .route("/sessions", web::get().to(handlers::sessions::list))
        .route("/sessions/{session_id}", web::get().to(handlers::sessions::get))
        .route(
            "/sessions/{session_id}",
            web::patch().to(handlers::sessions::rename),
        )
        .route(
            "/sessions/{session_id}",
            web::delete().to(handlers::sessions::delete),
        )
        .route(
            "/sessions/{session_id}/tree",
            web::get().to(handlers::sessions::tree),
        )
        .route(
            "/chat/completions",
            web::post().to(handlers::chat::completions),
        )
        .route("/nodes/{node_id}", web::get().to(handlers::nodes::get))
        .route("/nodes/{node_id}/path", web::get().to(handlers::nodes::path))
        .route(
            "/nodes/{node_id}/siblings",
            web::get().to(handlers::nodes::siblings),
        )
        .route(
            "/nodes/{node_id}/children",
            web::get().to(handlers::nodes::children),
        )
        .route("/nodes/{node_id}/branch", web::put().to(handlers::chat::branch))
        .route(
            "/nodes/{node_id}/continue",
            web::post().to(handlers::chat::continue_from),
        )
        .route("/nodes/{node_id}/stop", web::post().to(handlers::stop::handler));
}

fn legacy_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/session/{session_id}/tree",
        web::get().to(handlers::sessions::tree),
    )
    .route("/node/{node_id}/path", web::get().to(handlers::nodes::path))
    .route(
        "/node/{node_id}/siblings",
        web::get().to(handlers::nodes::siblings),
    )
    .route(
        "/node/{node_id}/children",
        web::get().to(handlers::nodes::children),
    )
    .route("/node/{node_id}/branch", web::put().to(handlers::chat::branch))
    .route(
        "/node/{node_id}/continue",
        web::post().to(handlers::chat::continue_from),
    );
}

pub async fn run_server(config: ServerConfig) -> io::Result<()> {
    let state = AppState::from_config(&config).await.map_err(|error| {
        log::error!("Failed to init tree store at {:?}: {}", config.db_path, error);
        io::Error::new(io::ErrorKind::Other, error.to_string())
    })?;
    let state = web::Data::new(state);

    let bind_address = config.bind_address();
    log::info!("Listening on http://{}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(app_config)
    })
    .bind(bind_address)?
    .run()
    .await
}
