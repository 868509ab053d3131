//! Anthropic Messages API adapter

use super::http::{build_client, encode_image, has_api_key, join_url, resolve_api_key, send_json};
use super::{ProviderAdapter, ProviderKind};
use crate::config::FileAnthropicConfig;
use async_trait::async_trait;
use avakin_application::{ModelRequest, ModelResponse, TransportError};
use avakin_domain::{ModelBackend, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct AnthropicAdapter {
    client: Client,
    config: FileAnthropicConfig,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: [UserMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: UserContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum UserContent<'a> {
    Text(&'a str),
    Blocks(Vec<InputBlock<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl From<MessagesResponse> for ModelResponse {
    fn from(response: MessagesResponse) -> Self {
        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text)
            .collect();
        let usage = response
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();
        ModelResponse::new(text).with_usage(usage)
    }
}

impl AnthropicAdapter {
    pub fn new(config: &FileAnthropicConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client()?,
            config: config.clone(),
        })
    }

    fn request_body<'a>(
        &self,
        backend: &'a ModelBackend,
        request: &'a ModelRequest,
    ) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &backend.model,
            max_tokens: self.config.max_tokens,
            system: &request.system,
            messages: [UserMessage {
                role: "user",
                content: user_content(request),
            }],
            temperature: request.temperature.or(backend.temperature),
        }
    }
}

/// Images go before the text block
fn user_content(request: &ModelRequest) -> UserContent<'_> {
    if request.images.is_empty() {
        return UserContent::Text(&request.prompt);
    }
    let mut blocks: Vec<InputBlock<'_>> = request
        .images
        .iter()
        .map(|image| InputBlock::Image {
            source: ImageSource {
                source_type: "base64",
                media_type: &image.media_type,
                data: encode_image(&image.data),
            },
        })
        .collect();
    blocks.push(InputBlock::Text {
        text: &request.prompt,
    });
    UserContent::Blocks(blocks)
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn complete(
        &self,
        backend: &ModelBackend,
        request: &ModelRequest,
    ) -> Result<ModelResponse, TransportError> {
        let key_env = backend
            .api_key_env
            .as_deref()
            .unwrap_or(&self.config.api_key_env);
        let api_key = resolve_api_key(key_env)?;
        let base = backend.endpoint.as_deref().unwrap_or(&self.config.base_url);
        debug!(model = %backend.model, "Anthropic messages request");

        let response: MessagesResponse = send_json(
            self.client
                .post(join_url(base, "v1/messages"))
                .header("x-api-key", api_key)
                .header("anthropic-version", &self.config.api_version)
                .json(&self.request_body(backend, request)),
        )
        .await?;
        Ok(response.into())
    }

    async fn available_models(&self) -> Result<Vec<ModelBackend>, TransportError> {
        if !has_api_key(&self.config.api_key_env) {
            return Ok(Vec::new());
        }
        Ok(self
            .config
            .models
            .iter()
            .map(|model| ModelBackend::cloud("anthropic", model, &self.config.api_key_env))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avakin_domain::ImageAttachment;

    #[test]
    fn test_request_body_shape() {
        let adapter = AnthropicAdapter::new(&FileAnthropicConfig::default()).unwrap();
        let backend = ModelBackend::cloud("anthropic", "claude-sonnet-4-20250514", "ANTHROPIC_API_KEY");
        let request = ModelRequest::new("You are the Architect.", "plan it");

        let body = serde_json::to_value(adapter.request_body(&backend, &request)).unwrap();

        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["system"], "You are the Architect.");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "plan it");
    }

    #[test]
    fn test_request_body_with_image_block() {
        let adapter = AnthropicAdapter::new(&FileAnthropicConfig::default()).unwrap();
        let backend = ModelBackend::cloud("anthropic", "claude-sonnet-4-20250514", "ANTHROPIC_API_KEY");
        let image = ImageAttachment::from_bytes("wireframe.webp", b"png!".to_vec()).unwrap();
        let request = ModelRequest::new("", "build this screen").with_images(vec![image]);

        let body = serde_json::to_value(adapter.request_body(&backend, &request)).unwrap();

        let blocks = &body["messages"][0]["content"];
        assert_eq!(blocks[0]["type"], "image");
        assert_eq!(blocks[0]["source"]["type"], "base64");
        assert_eq!(blocks[0]["source"]["media_type"], "image/webp");
        assert_eq!(blocks[0]["source"]["data"], "cG5nIQ==");
        assert_eq!(blocks[1]["type"], "text");
        assert_eq!(blocks[1]["text"], "build this screen");
    }

    #[test]
    fn test_response_joins_text_blocks() {
        let raw = r#"{"content":[{"type":"text","text":"a"},{"type":"tool_use","id":"x"},{"type":"text","text":"b"}],"usage":{"input_tokens":7,"output_tokens":2}}"#;

        let response: ModelResponse = serde_json::from_str::<MessagesResponse>(raw).unwrap().into();

        assert_eq!(response.text, "ab");
        assert_eq!(response.usage.total(), 9);
    }
}
