use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::Serialize;

use multiverse_core::GenerationEvent;
use multiverse_engine::Generation;

use crate::state::AppState;

/// One NDJSON line of a generation stream.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StreamChunk {
    pub token: String,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_node_id: Option<String>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&GenerationEvent> for StreamChunk {
    fn from(event: &GenerationEvent) -> Self {
        match event {
            GenerationEvent::Token {
                node_id,
                user_node_id,
                content,
            } => Self {
                token: content.clone(),
                node_id: node_id.clone(),
                user_node_id: user_node_id.clone(),
                done: false,
                full_content: None,
                error: None,
            },
            GenerationEvent::Complete {
                node_id,
                user_node_id,
                content,
            } => Self {
                token: String::new(),
                node_id: node_id.clone(),
                user_node_id: user_node_id.clone(),
                done: true,
                full_content: Some(content.clone()),
                error: None,
            },
            GenerationEvent::Error {
                node_id,
                user_node_id,
                message,
                content,
            } => Self {
                token: message.clone(),
                node_id: node_id.clone(),
                user_node_id: user_node_id.clone(),
                done: true,
                full_content: Some(content.clone()),
                error: Some(message.clone()),
            },
        }
    }
}

/// Registers the generation for cancellation and streams its events as
/// NDJSON until the terminal line.
pub async fn ndjson_response(state: &AppState, generation: Generation) -> HttpResponse {
    let Generation {
        session_id,
        assistant_node_id,
        mut events,
        cancel_token,
        handle,
        ..
    } = generation;

    state
        .generations
        .register(&session_id, &assistant_node_id, cancel_token)
        .await;

    let generations = state.generations.clone();
    let node_id = assistant_node_id.clone();
    tokio::spawn(async move {
        match handle.await {
            Ok(outcome) if outcome.is_success() => {
                log::info!("[{}] Stream finished ({} fragments)", node_id, outcome.fragment_count);
            }
            Ok(outcome) => {
                log::warn!(
                    "[{}] Stream ended with error: {}",
                    node_id,
                    outcome.error.unwrap_or_default()
                );
            }
            Err(error) => {
                log::error!("[{}] Generation task panicked: {}", node_id, error);
            }
        }
        generations.remove(&node_id).await;
    });

    HttpResponse::Ok()
        .content_type("application/x-ndjson")
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(async_stream::stream! {
            while let Some(event) = events.recv().await {
                let terminal = event.is_terminal();
                match serde_json::to_string(&StreamChunk::from(&event)) {
                    Ok(line) => yield Ok::<_, actix_web::Error>(web::Bytes::from(line + "\n")),
                    Err(error) => {
                        log::error!("[{}] Failed to encode event: {}", assistant_node_id, error)
                    }
                }
                if terminal {
                    break;
                }
            }
        })
}
