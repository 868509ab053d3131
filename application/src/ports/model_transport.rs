//! Model transport port
//!
//! Defines the interface for sending one completion request to a concrete
//! backend. Implementations (local daemon, cloud APIs) live in the
//! infrastructure layer; retry, timeout and fallback policy live in the
//! [`ModelRouter`](crate::use_cases::model_router::ModelRouter).

use async_trait::async_trait;
use avakin_domain::{ImageAttachment, ModelBackend, TokenUsage};
use thiserror::Error;

/// Errors a transport can report for a single attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout")]
    Timeout,

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API key not set: environment variable {0} is empty or missing")]
    MissingCredentials(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("No transport for provider '{0}'")]
    UnsupportedProvider(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Transport-level failures worth another attempt (connection, timeout,
    /// 5xx). Credential and request errors never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connection(_) | TransportError::Timeout | TransportError::Server { .. }
        )
    }

    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            TransportError::Authentication(_) | TransportError::MissingCredentials(_)
        )
    }
}

/// One completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: Option<f32>,
    /// Images sent with the prompt, in order
    pub images: Vec<ImageAttachment>,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: None,
            images: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }
}

/// A completed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
    pub usage: TokenUsage,
}

impl ModelResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Transport for model completions
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Send one request to `backend`. No retries at this level.
    async fn complete(
        &self,
        backend: &ModelBackend,
        request: &ModelRequest,
    ) -> Result<ModelResponse, TransportError>;

    /// Models this transport can currently serve (discovered, not assumed)
    async fn list_models(&self) -> Result<Vec<ModelBackend>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Connection("reset".into()).is_retryable());
        assert!(TransportError::Timeout.is_retryable());
        assert!(
            TransportError::Server {
                status: 503,
                message: "busy".into()
            }
            .is_retryable()
        );
        assert!(!TransportError::Authentication("bad key".into()).is_retryable());
        assert!(!TransportError::BadRequest("schema".into()).is_retryable());
        assert!(!TransportError::RateLimited("slow down".into()).is_retryable());
    }

    #[test]
    fn test_missing_credentials_is_authentication() {
        let err = TransportError::MissingCredentials("OPENAI_API_KEY".into());
        assert!(err.is_authentication());
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
