//! Local Ollama daemon adapter (`/api/chat`, `/api/tags`)

use super::http::{build_client, encode_image, join_url, send_json};
use super::{ProviderAdapter, ProviderKind};
use crate::config::FileOllamaConfig;
use async_trait::async_trait;
use avakin_application::{ModelRequest, ModelResponse, TransportError};
use avakin_domain::{ModelBackend, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const OLLAMA_BASE_ENV: &str = "OLLAMA_API_BASE";
pub const DEFAULT_OLLAMA_BASE: &str = "http://127.0.0.1:11434";

pub struct OllamaAdapter {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl<'a> ChatRequest<'a> {
    fn new(backend: &'a ModelBackend, request: &'a ModelRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system,
                images: Vec::new(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
            images: request.images.iter().map(|image| encode_image(&image.data)).collect(),
        });
        Self {
            model: &backend.model,
            messages,
            stream: false,
            options: request
                .temperature
                .or(backend.temperature)
                .map(|temperature| ChatOptions { temperature }),
        }
    }
}

impl From<ChatResponse> for ModelResponse {
    fn from(response: ChatResponse) -> Self {
        ModelResponse::new(response.message.content).with_usage(TokenUsage::new(
            response.prompt_eval_count,
            response.eval_count,
        ))
    }
}

impl OllamaAdapter {
    pub fn new(config: &FileOllamaConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client()?,
            base_url: resolve_base_url(
                config.base_url.as_deref(),
                std::env::var(OLLAMA_BASE_ENV).ok(),
            ),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Configured URL, then `OLLAMA_API_BASE`, then the default local port
fn resolve_base_url(configured: Option<&str>, env: Option<String>) -> String {
    configured
        .map(str::to_string)
        .or(env)
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_OLLAMA_BASE.to_string())
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn complete(
        &self,
        backend: &ModelBackend,
        request: &ModelRequest,
    ) -> Result<ModelResponse, TransportError> {
        let base = backend.endpoint.as_deref().unwrap_or(&self.base_url);
        let url = join_url(base, "api/chat");
        debug!(model = %backend.model, url = %url, "Ollama chat request");

        let response: ChatResponse =
            send_json(self.client.post(&url).json(&ChatRequest::new(backend, request))).await?;
        Ok(response.into())
    }

    async fn available_models(&self) -> Result<Vec<ModelBackend>, TransportError> {
        let tags: TagsResponse =
            send_json(self.client.get(join_url(&self.base_url, "api/tags"))).await?;
        Ok(tags
            .models
            .into_iter()
            .map(|entry| ModelBackend::local("ollama", entry.name))
            .collect())
    }
}
