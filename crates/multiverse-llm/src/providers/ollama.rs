use std::time::Duration;

use async_trait::async_trait;
use multiverse_core::ContextMessage;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::ndjson::{fragment_stream_from_ndjson, LineOutcome};
use crate::provider::{FragmentStream, InferenceError, InferenceProvider, ModelInfo, Result};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest silence tolerated between reads; a stream may run for any length overall.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

fn build_client(idle_timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(idle_timeout)
        .build()
        .unwrap_or_default()
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(IDLE_TIMEOUT),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ContextMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

fn parse_chat_line(line: &str) -> Result<LineOutcome> {
    let chunk: OllamaChatChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(error) => {
            log::debug!("Skipping undecodable Ollama line: {}", error);
            return Ok(LineOutcome::Skip);
        }
    };

    if let Some(error) = chunk.error {
        return Err(InferenceError::Api(error));
    }

    let fragment = chunk
        .message
        .map(|message| message.content)
        .filter(|content| !content.is_empty());

    if chunk.done {
        return Ok(LineOutcome::Done(fragment));
    }

    Ok(fragment.map_or(LineOutcome::Skip, LineOutcome::Fragment))
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    async fn generate(&self, context: &[ContextMessage], model: &str) -> Result<FragmentStream> {
        let body = OllamaChatRequest {
            model,
            messages: context,
            stream: true,
        };
        log::debug!(
            "Ollama chat request: model={}, messages={}",
            model,
            context.len()
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(InferenceError::Api(format!("HTTP {}: {}", status, text)));
        }

        Ok(fragment_stream_from_ndjson(response, parse_chat_line))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        let tags: OllamaTags = response.json().await?;
        Ok(tags.models)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                log::debug!("Ollama health check failed: {}", error);
                false
            }
        }
    }
}
