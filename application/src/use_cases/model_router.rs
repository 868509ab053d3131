//! Model router use case
//!
//! Maps agent roles to backends and invokes them with a timeout, bounded
//! exponential-backoff retry on transport failures, and fallback to a
//! role's secondary backend when the primary is unavailable.
//!
//! Configuration changes go through [`ModelRouter::reconfigure`] only and
//! are refused while a pipeline run holds a [`RunGuard`], so a role is never
//! rebound mid-run.

use crate::ports::model_transport::{ModelRequest, ModelResponse, ModelTransport, TransportError};
use crate::ports::pipeline_progress::{NoPipelineProgress, PipelineProgressNotifier};
use avakin_domain::{AgentRole, ModelBackend, RoleBinding};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("No backend configured for role '{0}'")]
    Unbound(AgentRole),

    #[error("Backend {backend} unavailable after {attempts} attempt(s): {reason}")]
    BackendUnavailable {
        backend: String,
        attempts: usize,
        reason: String,
    },

    #[error("Authentication failed for {backend}: {reason}")]
    Authentication { backend: String, reason: String },

    #[error("Request to {backend} failed: {source}")]
    Request {
        backend: String,
        source: TransportError,
    },

    #[error("Cannot reconfigure models while a pipeline run is active")]
    RunActive,

    #[error("Operation cancelled")]
    Cancelled,
}

impl RouterError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RouterError::Cancelled)
    }
}

/// Timeout and retry bounds for model calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: usize) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Role bindings plus call policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouterConfig {
    pub bindings: HashMap<AgentRole, RoleBinding>,
    pub retry: RetryPolicy,
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binding(mut self, role: AgentRole, binding: RoleBinding) -> Self {
        self.bindings.insert(role, binding);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Result of a role invocation
#[derive(Debug, Clone)]
pub struct RoleInvocation {
    pub response: ModelResponse,
    pub backend: ModelBackend,
    pub used_fallback: bool,
}

/// Held for the duration of a pipeline run
pub struct RunGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ModelRouter {
    transport: Arc<dyn ModelTransport>,
    config: RwLock<RouterConfig>,
    active_runs: Arc<AtomicUsize>,
    progress: Arc<dyn PipelineProgressNotifier>,
}

impl ModelRouter {
    pub fn new(transport: Arc<dyn ModelTransport>, config: RouterConfig) -> Self {
        Self {
            transport,
            config: RwLock::new(config),
            active_runs: Arc::new(AtomicUsize::new(0)),
            progress: Arc::new(NoPipelineProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn PipelineProgressNotifier>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> RouterConfig {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Current binding for `role`
    pub fn resolve(&self, role: &AgentRole) -> Result<RoleBinding, RouterError> {
        self.config
            .read()
            .ok()
            .and_then(|c| c.bindings.get(role).cloned())
            .ok_or_else(|| RouterError::Unbound(role.clone()))
    }

    /// Replace the configuration. Refused while any run is active.
    pub fn reconfigure(&self, config: RouterConfig) -> Result<(), RouterError> {
        // begin_run counts under the read lock
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if self.active_runs.load(Ordering::SeqCst) > 0 {
            return Err(RouterError::RunActive);
        }
        *current = config;
        info!("Model router reconfigured");
        Ok(())
    }

    /// Mark a run as active until the guard is dropped
    pub fn begin_run(&self) -> RunGuard {
        let _config = self.config.read();
        self.active_runs.fetch_add(1, Ordering::SeqCst);
        RunGuard {
            active: Arc::clone(&self.active_runs),
        }
    }

    pub fn is_run_active(&self) -> bool {
        self.active_runs.load(Ordering::SeqCst) > 0
    }

    /// Models discovered by the transports
    pub async fn available_models(&self) -> Result<Vec<ModelBackend>, TransportError> {
        self.transport.list_models().await
    }

    /// Invoke one backend with timeout and bounded retry.
    ///
    /// Retries only transport-level failures, exactly `max_retries` times,
    /// then reports [`RouterError::BackendUnavailable`]. Authentication and
    /// malformed-request failures return immediately.
    pub async fn invoke(
        &self,
        backend: &ModelBackend,
        request: &ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, RouterError> {
        let policy = self.config().retry;
        let label = backend.label();
        let mut retries = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RouterError::Cancelled);
            }

            debug!(backend = %label, attempt = retries + 1, "Invoking model");
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RouterError::Cancelled),
                r = tokio::time::timeout(policy.timeout, self.transport.complete(backend, request)) => r,
            };

            let error = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_) => TransportError::Timeout,
            };

            if error.is_authentication() {
                return Err(RouterError::Authentication {
                    backend: label,
                    reason: error.to_string(),
                });
            }
            if !error.is_retryable() {
                return Err(RouterError::Request {
                    backend: label,
                    source: error,
                });
            }
            if retries >= policy.max_retries {
                warn!(backend = %label, attempts = retries + 1, "Backend unavailable");
                return Err(RouterError::BackendUnavailable {
                    backend: label,
                    attempts: retries + 1,
                    reason: error.to_string(),
                });
            }

            retries += 1;
            warn!(
                backend = %label,
                retry = retries,
                max_retries = policy.max_retries,
                error = %error,
                "Transport failure, retrying"
            );
            self.progress
                .on_retry(&label, retries, policy.max_retries, &error.to_string());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RouterError::Cancelled),
                _ = tokio::time::sleep(policy.backoff(retries)) => {}
            }
        }
    }

    /// Invoke the backend bound to `role`, falling back to the secondary
    /// backend when the primary is unavailable.
    pub async fn invoke_role(
        &self,
        role: &AgentRole,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<RoleInvocation, RouterError> {
        let binding = self.resolve(role)?;
        self.invoke_binding(role, &binding, request, cancel).await
    }

    pub(crate) async fn invoke_binding(
        &self,
        role: &AgentRole,
        binding: &RoleBinding,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<RoleInvocation, RouterError> {
        let request_for = |backend: &ModelBackend| {
            let mut req = request.clone();
            if req.temperature.is_none() {
                req.temperature = Some(
                    backend
                        .temperature
                        .unwrap_or_else(|| role.default_temperature()),
                );
            }
            req
        };

        let primary = &binding.primary;
        match self.invoke(primary, &request_for(primary), cancel).await {
            Ok(response) => Ok(RoleInvocation {
                response,
                backend: primary.clone(),
                used_fallback: false,
            }),
            Err(e @ RouterError::BackendUnavailable { .. }) => {
                let Some(fallback) = binding.fallback.as_ref() else {
                    return Err(e);
                };
                warn!(
                    role = %role,
                    primary = %primary.label(),
                    fallback = %fallback.label(),
                    "Falling back to secondary backend"
                );
                self.progress
                    .on_fallback(role, &primary.label(), &fallback.label());
                let response = self.invoke(fallback, &request_for(fallback), cancel).await?;
                Ok(RoleInvocation {
                    response,
                    backend: fallback.clone(),
                    used_fallback: true,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport returning scripted results per model, recording calls
    struct ScriptedTransport {
        scripts: Mutex<HashMap<String, VecDeque<Result<ModelResponse, TransportError>>>>,
        calls: Mutex<Vec<(String, Option<f32>)>>,
        delay: Option<Duration>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn script(self, model: &str, results: Vec<Result<ModelResponse, TransportError>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(model.to_string(), results.into());
            self
        }

        fn calls_to(&self, model: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == model)
                .count()
        }
    }

    #[async_trait]
    impl ModelTransport for ScriptedTransport {
        async fn complete(
            &self,
            backend: &ModelBackend,
            request: &ModelRequest,
        ) -> Result<ModelResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((backend.model.clone(), request.temperature));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&backend.model)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| Err(TransportError::Connection("refused".to_string())))
        }

        async fn list_models(&self) -> Result<Vec<ModelBackend>, TransportError> {
            Ok(vec![ModelBackend::local("ollama", "llama3")])
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }

    fn router(transport: ScriptedTransport, max_retries: usize) -> (ModelRouter, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let config = RouterConfig::new()
            .with_binding(
                AgentRole::Coder,
                RoleBinding::new(ModelBackend::local("ollama", "primary"))
                    .with_fallback(ModelBackend::local("ollama", "secondary")),
            )
            .with_binding(
                AgentRole::Reviewer,
                RoleBinding::new(ModelBackend::cloud("openai", "gpt", "OPENAI_API_KEY")),
            )
            .with_retry(fast_policy(max_retries));
        (ModelRouter::new(transport.clone(), config), transport)
    }

    fn ok(text: &str) -> Result<ModelResponse, TransportError> {
        Ok(ModelResponse::new(text))
    }

    #[tokio::test]
    async fn test_retries_exactly_n_times_then_unavailable() {
        let (router, transport) = router(ScriptedTransport::new(), 2);
        let backend = ModelBackend::local("ollama", "down");
        let err = router
            .invoke(&backend, &ModelRequest::new("s", "p"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RouterError::BackendUnavailable { attempts: 3, .. }));
        assert_eq!(transport.calls_to("down"), 3);
    }

    #[tokio::test]
    async fn test_authentication_is_not_retried() {
        let transport = ScriptedTransport::new().script(
            "gpt",
            vec![Err(TransportError::Authentication("401".to_string())), ok("never")],
        );
        let (router, transport) = router(transport, 3);
        let err = router
            .invoke_role(&AgentRole::Reviewer, ModelRequest::new("s", "p"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RouterError::Authentication { .. }));
        assert_eq!(transport.calls_to("gpt"), 1);
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let transport = ScriptedTransport::new().script(
            "gpt",
            vec![Err(TransportError::BadRequest("unknown model".to_string()))],
        );
        let (router, transport) = router(transport, 3);
        let err = router
            .invoke_role(&AgentRole::Reviewer, ModelRequest::new("s", "p"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RouterError::Request { .. }));
        assert_eq!(transport.calls_to("gpt"), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_server_error() {
        let transport = ScriptedTransport::new().script(
            "primary",
            vec![
                Err(TransportError::Server {
                    status: 503,
                    message: "loading".to_string(),
                }),
                ok("def main(): pass"),
            ],
        );
        let (router, transport) = router(transport, 2);
        let result = router
            .invoke_role(&AgentRole::Coder, ModelRequest::new("s", "p"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.response.text, "def main(): pass");
        assert!(!result.used_fallback);
        assert_eq!(transport.calls_to("primary"), 2);
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_unavailable() {
        let transport = ScriptedTransport::new().script("secondary", vec![ok("from fallback")]);
        let (router, transport) = router(transport, 1);
        let result = router
            .invoke_role(&AgentRole::Coder, ModelRequest::new("s", "p"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.used_fallback);
        assert_eq!(result.backend.model, "secondary");
        assert_eq!(result.response.text, "from fallback");
        assert_eq!(transport.calls_to("primary"), 2);
    }

    #[tokio::test]
    async fn test_role_default_temperature_applied() {
        let transport = ScriptedTransport::new().script("primary", vec![ok("x")]);
        let (router, transport) = router(transport, 0);
        router
            .invoke_role(&AgentRole::Coder, ModelRequest::new("s", "p"), &CancellationToken::new())
            .await
            .unwrap();
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, Some(0.1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transport_failure() {
        let transport = ScriptedTransport::new()
            .with_delay(Duration::from_secs(60))
            .script("slow", vec![ok("late")]);
        let (router, _) = router(transport, 0);
        let err = router
            .invoke(
                &ModelBackend::local("ollama", "slow"),
                &ModelRequest::new("s", "p"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            RouterError::BackendUnavailable { reason, .. } => assert_eq!(reason, "Timeout"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let (router, transport) = router(ScriptedTransport::new(), 3);
        let token = CancellationToken::new();
        token.cancel();
        let err = router
            .invoke_role(&AgentRole::Coder, ModelRequest::new("s", "p"), &token)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(transport.calls_to("primary"), 0);
    }

    #[tokio::test]
    async fn test_unbound_role() {
        let (router, _) = router(ScriptedTransport::new(), 0);
        let err = router.resolve(&AgentRole::Chat).unwrap_err();
        assert_eq!(err, RouterError::Unbound(AgentRole::Chat));
    }

    #[test]
    fn test_reconfigure_rejected_while_run_active() {
        let (router, _) = router(ScriptedTransport::new(), 0);
        let new_config = RouterConfig::new().with_binding(
            AgentRole::Chat,
            RoleBinding::new(ModelBackend::local("ollama", "chatty")),
        );

        let guard = router.begin_run();
        assert_eq!(router.reconfigure(new_config.clone()), Err(RouterError::RunActive));
        assert!(router.resolve(&AgentRole::Chat).is_err());

        drop(guard);
        router.reconfigure(new_config).unwrap();
        assert_eq!(router.resolve(&AgentRole::Chat).unwrap().primary.model, "chatty");
    }

    #[test]
    fn test_begin_run_waits_for_reconfigure_in_progress() {
        let (router, _) = router(ScriptedTransport::new(), 0);

        std::thread::scope(|scope| {
            let config = router.config.write().unwrap();
            let starting = scope.spawn(|| router.begin_run());
            std::thread::sleep(Duration::from_millis(50));
            assert!(!router.is_run_active());

            drop(config);
            let guard = starting.join().unwrap();
            assert!(router.is_run_active());
            assert_eq!(
                router.reconfigure(RouterConfig::new()),
                Err(RouterError::RunActive)
            );
            drop(guard);
        });

        assert!(router.reconfigure(RouterConfig::new()).is_ok());
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
    }
}
