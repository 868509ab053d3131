//! OpenAI-compatible chat completions adapter (OpenAI, DeepSeek)

use super::http::{build_client, encode_image, has_api_key, join_url, resolve_api_key, send_json};
use super::{ProviderAdapter, ProviderKind};
use crate::config::FileCloudConfig;
use async_trait::async_trait;
use avakin_application::{ModelRequest, ModelResponse, TransportError};
use avakin_domain::{ModelBackend, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct OpenAiCompatibleAdapter {
    kind: ProviderKind,
    client: Client,
    config: FileCloudConfig,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

/// Plain text, or content parts when images ride along
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl<'a> CompletionRequest<'a> {
    fn new(backend: &'a ModelBackend, request: &'a ModelRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(Message {
                role: "system",
                content: MessageContent::Text(&request.system),
            });
        }
        messages.push(Message {
            role: "user",
            content: user_content(request),
        });
        Self {
            model: &backend.model,
            messages,
            temperature: request.temperature.or(backend.temperature),
        }
    }
}

fn user_content(request: &ModelRequest) -> MessageContent<'_> {
    if request.images.is_empty() {
        return MessageContent::Text(&request.prompt);
    }
    let mut parts = vec![ContentPart::Text {
        text: &request.prompt,
    }];
    parts.extend(request.images.iter().map(|image| ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: format!("data:{};base64,{}", image.media_type, encode_image(&image.data)),
        },
    }));
    MessageContent::Parts(parts)
}

impl TryFrom<CompletionResponse> for ModelResponse {
    type Error = TransportError;

    fn try_from(response: CompletionResponse) -> Result<Self, Self::Error> {
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| TransportError::InvalidResponse("no choices in response".to_string()))?;
        let usage = response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        Ok(ModelResponse::new(text).with_usage(usage))
    }
}

impl OpenAiCompatibleAdapter {
    pub fn new(kind: ProviderKind, config: &FileCloudConfig) -> Result<Self, TransportError> {
        Ok(Self {
            kind,
            client: build_client()?,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind.clone()
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
        let url = join_url(base, "chat/completions");
        debug!(provider = self.kind.as_str(), model = %backend.model, "Chat completion request");

        let response: CompletionResponse = send_json(
            self.client
                .post(&url)
                .bearer_auth(api_key)
                .json(&CompletionRequest::new(backend, request)),
        )
        .await?;
        response.try_into()
    }

    /// Catalog models, listed only when the provider's key is set
    async fn available_models(&self) -> Result<Vec<ModelBackend>, TransportError> {
        if !has_api_key(&self.config.api_key_env) {
            return Ok(Vec::new());
        }
        Ok(self
            .config
            .models
            .iter()
            .map(|model| ModelBackend::cloud(self.kind.as_str(), model, &self.config.api_key_env))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avakin_domain::ImageAttachment;

    #[test]
    fn test_request_body_omits_system_when_empty() {
        let backend = ModelBackend::cloud("deepseek", "deepseek-chat", "DEEPSEEK_API_KEY");
        let request = ModelRequest::new("", "write code");

        let body = serde_json::to_value(CompletionRequest::new(&backend, &request)).unwrap();

        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][0]["content"], "write code");
    }

    #[test]
    fn test_request_body_with_image_uses_content_parts() {
        let backend = ModelBackend::cloud("openai", "gpt-4o", "OPENAI_API_KEY");
        let image = ImageAttachment::from_bytes("ui.png", b"png!".to_vec()).unwrap();
        let request = ModelRequest::new("sys", "match this layout").with_images(vec![image]);

        let body = serde_json::to_value(CompletionRequest::new(&backend, &request)).unwrap();

        assert_eq!(body["messages"][0]["content"], "sys");
        let parts = &body["messages"][1]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "match this layout");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,cG5nIQ==");
    }

    #[test]
    fn test_response_with_usage() {
        let raw = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"done"},"finish_reason":"stop"}],"usage":{"prompt_tokens":20,"completion_tokens":5,"total_tokens":25}}"#;

        let response: ModelResponse = serde_json::from_str::<CompletionResponse>(raw)
            .unwrap()
            .try_into()
            .unwrap();

        assert_eq!(response.text, "done");
        assert_eq!(response.usage, TokenUsage::new(20, 5));
    }

    #[test]
    fn test_empty_choices_is_invalid_response() {
        let parsed: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        let result: Result<ModelResponse, _> = parsed.try_into();
        assert!(matches!(result, Err(TransportError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_request() {
        let mut config = FileCloudConfig::deepseek();
        config.api_key_env = "AVAKIN_TEST_DEEPSEEK_KEY_UNSET".to_string();
        config.base_url = "http://127.0.0.1:9".to_string();
        let adapter = OpenAiCompatibleAdapter::new(ProviderKind::DeepSeek, &config).unwrap();
        let backend =
            ModelBackend::cloud("deepseek", "deepseek-chat", "AVAKIN_TEST_DEEPSEEK_KEY_UNSET");

        let err = adapter
            .complete(&backend, &ModelRequest::new("", "hi"))
            .await
            .unwrap_err();

        assert!(err.is_authentication());
        assert!(adapter.available_models().await.unwrap().is_empty());
    }
}
