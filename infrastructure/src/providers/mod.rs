//! Model provider adapters
//!
//! Each adapter speaks one provider's HTTP API. The [`RoutingTransport`]
//! picks the adapter serving a backend's provider and implements the
//! application's [`ModelTransport`](avakin_application::ModelTransport).

mod anthropic;
pub(crate) mod http;
mod ollama;
mod openai;
pub mod routing;

pub use anthropic::AnthropicAdapter;
pub use ollama::{DEFAULT_OLLAMA_BASE, OLLAMA_BASE_ENV, OllamaAdapter};
pub use openai::OpenAiCompatibleAdapter;
pub use routing::RoutingTransport;

use crate::config::FileProvidersConfig;
use async_trait::async_trait;
use avakin_application::{ModelRequest, ModelResponse, TransportError};
use avakin_domain::ModelBackend;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Ollama,
    OpenAi,
    DeepSeek,
    Anthropic,
}

impl ProviderKind {
    /// Provider identifier as written in `provider/model` assignments
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn serves(&self, provider: &str) -> bool {
        self.kind().as_str() == provider
    }

    async fn complete(
        &self,
        backend: &ModelBackend,
        request: &ModelRequest,
    ) -> Result<ModelResponse, TransportError>;

    async fn available_models(&self) -> Result<Vec<ModelBackend>, TransportError>;
}

/// Every built-in adapter, configured from `[providers]`
pub fn default_adapters(
    config: &FileProvidersConfig,
) -> Result<Vec<Arc<dyn ProviderAdapter>>, TransportError> {
    Ok(vec![
        Arc::new(OllamaAdapter::new(&config.ollama)?),
        Arc::new(OpenAiCompatibleAdapter::new(
            ProviderKind::OpenAi,
            &config.openai,
        )?),
        Arc::new(OpenAiCompatibleAdapter::new(
            ProviderKind::DeepSeek,
            &config.deepseek,
        )?),
        Arc::new(AnthropicAdapter::new(&config.anthropic)?),
    ])
}
