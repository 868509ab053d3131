//! Model router tunables from TOML (`[router]` section)

use avakin_application::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRouterConfig {
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt on connection errors, timeouts and 5xx
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for FileRouterConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl FileRouterConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}
