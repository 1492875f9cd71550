#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use actix_http::Request;
use actix_web::{
    dev::{Service, ServiceResponse},
    test, web, App, Error,
};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;

use multiverse_core::{ContextMessage, SqliteTreeStore, TreeStore};
use multiverse_engine::EngineConfig;
use multiverse_llm::{FragmentStream, InferenceError, InferenceProvider, ModelInfo, Result};
use multiverse_server::{app_config, AppState};

pub const TEST_MODEL: &str = "gemma3:4b";

#[derive(Clone, Copy, PartialEq)]
pub enum Script {
    /// Yields the fragments then ends.
    Reply,
    /// Yields the fragments then fails.
    FailAfter,
    /// Yields the fragments then never ends.
    Hang,
}

/// Inference provider that answers from a fixed script.
pub struct FakeProvider {
    fragments: Vec<String>,
    script: Script,
    healthy: bool,
    calls: Mutex<Vec<(Vec<ContextMessage>, String)>>,
}

impl FakeProvider {
    pub fn new(fragments: &[&str], script: Script) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            script,
            healthy: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn calls(&self) -> Vec<(Vec<ContextMessage>, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceProvider for FakeProvider {
    async fn generate(&self, context: &[ContextMessage], model: &str) -> Result<FragmentStream> {
        self.calls
            .lock()
            .unwrap()
            .push((context.to_vec(), model.to_string()));

        let fragments = stream::iter(self.fragments.clone().into_iter().map(Ok));
        let stream: FragmentStream = match self.script {
            Script::Reply => Box::pin(fragments),
            Script::FailAfter => Box::pin(fragments.chain(stream::once(async {
                Err(InferenceError::Stream("connection reset".to_string()))
            }))),
            Script::Hang => Box::pin(fragments.chain(stream::pending())),
        };
        Ok(stream)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        if !self.healthy {
            return Err(InferenceError::Api("ollama offline".to_string()));
        }
        Ok(vec![ModelInfo {
            name: TEST_MODEL.to_string(),
            size: Some(3_300_000_000),
            modified_at: None,
        }])
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

pub struct TestApp<S> {
    pub service: S,
    pub state: AppState,
    pub provider: Arc<FakeProvider>,
    _dir: TempDir,
}

pub async fn setup_app(
    provider: FakeProvider,
) -> TestApp<impl Service<Request, Response = ServiceResponse, Error = Error>> {
    let dir = TempDir::new().unwrap();
    let store = SqliteTreeStore::new(dir.path().join("chat.db"));
    store.init().await.unwrap();

    let provider = Arc::new(provider);
    let state = AppState::new(
        Arc::new(store),
        provider.clone(),
        EngineConfig::default(),
        TEST_MODEL,
    );
    let service = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(app_config),
    )
    .await;

    TestApp {
        service,
        state,
        provider,
        _dir: dir,
    }
}

/// Splits an NDJSON body into parsed lines.
pub fn ndjson_lines(body: &[u8]) -> Vec<Value> {
    std::str::from_utf8(body)
        .unwrap()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

pub async fn create_session<S>(app: &S, name: &str) -> String
where
    S: Service<Request, Response = ServiceResponse, Error = Error>,
{
    let req = test::TestRequest::post()
        .uri("/api/v1/sessions")
        .set_json(json!({ "name": name }))
        .to_request();
    let session: Value = test::call_and_read_body_json(app, req).await;
    session["id"].as_str().unwrap().to_string()
}

/// Sends a chat turn and returns the parsed stream lines.
pub async fn chat<S>(
    app: &S,
    session_id: &str,
    parent_id: Option<&str>,
    content: &str,
) -> Vec<Value>
where
    S: Service<Request, Response = ServiceResponse, Error = Error>,
{
    let req = test::TestRequest::post()
        .uri("/api/v1/chat/completions")
        .set_json(json!({
            "session_id": session_id,
            "parent_id": parent_id,
            "content": content,
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 200);
    ndjson_lines(&test::read_body(resp).await)
}

pub async fn get_json<S>(app: &S, uri: &str) -> (u16, Value)
where
    S: Service<Request, Response = ServiceResponse, Error = Error>,
{
    let req = test::TestRequest::get().uri(uri).to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let body = test::read_body(resp).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}
