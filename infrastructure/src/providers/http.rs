//! Shared HTTP plumbing for provider adapters

use avakin_application::TransportError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client() -> Result<Client, TransportError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| TransportError::Connection(format!("Failed to create HTTP client: {}", e)))
}

/// Read an API key from the named environment variable
pub(crate) fn resolve_api_key(env_name: &str) -> Result<String, TransportError> {
    match std::env::var(env_name) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(TransportError::MissingCredentials(env_name.to_string())),
    }
}

pub(crate) fn has_api_key(env_name: &str) -> bool {
    resolve_api_key(env_name).is_ok()
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Standard base64 payload for an image attachment
pub(crate) fn encode_image(data: &[u8]) -> String {
    STANDARD.encode(data)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Nested { error: ErrorDetail },
    Flat { error: String },
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Best-effort error message from a provider's error body
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Flat { error }) => error,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => avakin_domain::truncate(body, 300),
    }
}

pub(crate) fn map_status(status: StatusCode, body: &str) -> TransportError {
    let message = error_message(body);
    match status.as_u16() {
        401 | 403 => TransportError::Authentication(message),
        429 => TransportError::RateLimited(message),
        code @ 500..=599 => TransportError::Server {
            status: code,
            message,
        },
        _ => TransportError::BadRequest(format!("HTTP {}: {}", status.as_u16(), message)),
    }
}

pub(crate) fn map_reqwest(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_decode() {
        TransportError::InvalidResponse(error.to_string())
    } else if let Some(status) = error.status() {
        map_status(status, "")
    } else {
        TransportError::Connection(error.to_string())
    }
}

/// Send a prepared request and decode a JSON body, mapping HTTP failures
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, TransportError> {
    let response = request.send().await.map_err(map_reqwest)?;
    let status = response.status();
    let body = response.text().await.map_err(map_reqwest)?;
    if !status.is_success() {
        return Err(map_status(status, &body));
    }
    serde_json::from_str(&body).map_err(|e| {
        TransportError::InvalidResponse(format!("{}: {}", e, avakin_domain::truncate(&body, 300)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, r#"{"error":{"message":"bad key"}}"#),
            TransportError::Authentication(m) if m == "bad key"
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, ""),
            TransportError::RateLimited(_)
        ));
        assert!(matches!(
            map_status(StatusCode::SERVICE_UNAVAILABLE, r#"{"error":"loading model"}"#),
            TransportError::Server { status: 503, message } if message == "loading model"
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "model not found"),
            TransportError::BadRequest(m) if m.contains("404")
        ));
    }

    #[test]
    fn test_missing_key_is_missing_credentials() {
        let err = resolve_api_key("AVAKIN_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert_eq!(
            err,
            TransportError::MissingCredentials("AVAKIN_TEST_KEY_THAT_IS_NEVER_SET".to_string())
        );
        assert!(!has_api_key("AVAKIN_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_encode_image() {
        assert_eq!(encode_image(b"png!"), "cG5nIQ==");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h:1/", "/api/chat"), "http://h:1/api/chat");
        assert_eq!(join_url("https://x/v1", "chat/completions"), "https://x/v1/chat/completions");
    }
}
