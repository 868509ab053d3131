use super::{ProviderAdapter, ProviderKind};
use async_trait::async_trait;
use avakin_application::{ModelRequest, ModelResponse, ModelTransport, TransportError};
use avakin_domain::ModelBackend;
use std::sync::Arc;
use tracing::warn;

/// Dispatches each request to the adapter serving the backend's provider
pub struct RoutingTransport {
    providers: Vec<Arc<dyn ProviderAdapter>>,
}

impl RoutingTransport {
    pub fn new(providers: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self { providers }
    }

    /// Routing priority:
    ///  1. the adapter whose provider id matches the backend's
    ///  2. an unknown cloud provider with an explicit endpoint is spoken to
    ///     over the OpenAI-compatible protocol
    ///  3. otherwise `UnsupportedProvider`
    fn resolve_provider(&self, backend: &ModelBackend) -> Result<&dyn ProviderAdapter, TransportError> {
        if let Some(p) = self.providers.iter().find(|p| p.serves(&backend.provider)) {
            return Ok(p.as_ref());
        }

        if !backend.is_local()
            && backend.endpoint.is_some()
            && let Some(p) = self.providers.iter().find(|p| p.kind() == ProviderKind::OpenAi)
        {
            return Ok(p.as_ref());
        }

        Err(TransportError::UnsupportedProvider(backend.provider.clone()))
    }
}

#[async_trait]
impl ModelTransport for RoutingTransport {
    async fn complete(
        &self,
        backend: &ModelBackend,
        request: &ModelRequest,
    ) -> Result<ModelResponse, TransportError> {
        self.resolve_provider(backend)?.complete(backend, request).await
    }

    /// Models from every reachable provider; unreachable ones are skipped
    async fn list_models(&self) -> Result<Vec<ModelBackend>, TransportError> {
        let mut all_models = Vec::new();
        for provider in &self.providers {
            match provider.available_models().await {
                Ok(models) => all_models.extend(models),
                Err(e) => warn!(provider = provider.kind().as_str(), error = %e, "Model discovery failed"),
            }
        }
        Ok(all_models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Mock ProviderAdapter --------------------------------------------------

    struct MockProvider {
        kind: ProviderKind,
        models: Result<Vec<ModelBackend>, TransportError>,
    }

    impl MockProvider {
        fn new(kind: ProviderKind) -> Arc<dyn ProviderAdapter> {
            Arc::new(Self {
                kind,
                models: Ok(vec![]),
            })
        }

        fn with_models(
            kind: ProviderKind,
            models: Result<Vec<ModelBackend>, TransportError>,
        ) -> Arc<dyn ProviderAdapter> {
            Arc::new(Self { kind, models })
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        fn kind(&self) -> ProviderKind {
            self.kind.clone()
        }

        async fn complete(
            &self,
            backend: &ModelBackend,
            _request: &ModelRequest,
        ) -> Result<ModelResponse, TransportError> {
            Ok(ModelResponse::new(format!("{}:{}", self.kind.as_str(), backend.model)))
        }

        async fn available_models(&self) -> Result<Vec<ModelBackend>, TransportError> {
            self.models.clone()
        }
    }

    fn request() -> ModelRequest {
        ModelRequest::new("", "hi")
    }

    #[tokio::test]
    async fn routes_by_provider_id() {
        let transport = RoutingTransport::new(vec![
            MockProvider::new(ProviderKind::Ollama),
            MockProvider::new(ProviderKind::DeepSeek),
        ]);

        let local = transport
            .complete(&ModelBackend::local("ollama", "llama3.1"), &request())
            .await
            .unwrap();
        let cloud = transport
            .complete(
                &ModelBackend::from_assignment("deepseek/deepseek-chat").unwrap(),
                &request(),
            )
            .await
            .unwrap();

        assert_eq!(local.text, "ollama:llama3.1");
        assert_eq!(cloud.text, "deepseek:deepseek-chat");
    }

    #[tokio::test]
    async fn unknown_provider_with_endpoint_uses_openai_protocol() {
        let transport = RoutingTransport::new(vec![
            MockProvider::new(ProviderKind::Ollama),
            MockProvider::new(ProviderKind::OpenAi),
        ]);
        let backend = ModelBackend::from_assignment("groq/llama-3.3-70b")
            .unwrap()
            .with_endpoint("https://api.groq.com/openai/v1");

        let response = transport.complete(&backend, &request()).await.unwrap();

        assert_eq!(response.text, "openai:llama-3.3-70b");
    }

    #[tokio::test]
    async fn unknown_provider_without_endpoint_is_unsupported() {
        let transport = RoutingTransport::new(vec![MockProvider::new(ProviderKind::OpenAi)]);

        let err = transport
            .complete(&ModelBackend::from_assignment("groq/x").unwrap(), &request())
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::UnsupportedProvider("groq".to_string()));
    }

    #[tokio::test]
    async fn list_models_skips_unreachable_providers() {
        let transport = RoutingTransport::new(vec![
            MockProvider::with_models(
                ProviderKind::Ollama,
                Err(TransportError::Connection("refused".into())),
            ),
            MockProvider::with_models(
                ProviderKind::Anthropic,
                Ok(vec![ModelBackend::cloud("anthropic", "claude", "ANTHROPIC_API_KEY")]),
            ),
        ]);

        let models = transport.list_models().await.unwrap();

        assert_eq!(models.len(), 1);
        assert_eq!(models[0].label(), "anthropic/claude");
    }
}
