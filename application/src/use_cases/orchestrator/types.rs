//! Types for the orchestrator use case

use crate::ports::workspace::WorkspaceError;
use crate::use_cases::model_router::RouterError;
use avakin_domain::{
    BlueprintError, BuildStage, DomainError, ParseFailure, PipelineRun, PlanState, RunId,
    RunLimits,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("A pipeline run is already active ({0})")]
    PipelineBusy(RunId),

    #[error("No blueprint is awaiting approval (plan state: {0})")]
    NotAwaitingApproval(PlanState),

    #[error("Blueprint is not valid: {0}")]
    InvalidBlueprint(#[from] BlueprintError),

    #[error(transparent)]
    Router(RouterError),

    #[error("{stage} produced an unusable response: {failure}")]
    Parse {
        stage: BuildStage,
        failure: ParseFailure,
    },

    #[error("Validation failed: {}", errors.join("; "))]
    ValidationFailure { errors: Vec<String> },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Pipeline task failed: {0}")]
    TaskFailed(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestratorError::Cancelled)
    }
}

impl From<RouterError> for OrchestratorError {
    fn from(error: RouterError) -> Self {
        match error {
            RouterError::Cancelled => OrchestratorError::Cancelled,
            other => OrchestratorError::Router(other),
        }
    }
}

/// Tunables of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub limits: RunLimits,
    /// Chunks retrieved per stage query (0 disables retrieval)
    pub context_chunks: usize,
    /// Consult the global store in addition to the project store
    pub include_global: bool,
    /// Conversation turns included in Plan-mode prompts
    pub history_turns: usize,
    /// Per-file cap on rolling context passed to the Coder
    pub max_context_file_bytes: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            limits: RunLimits::default(),
            context_chunks: 5,
            include_global: true,
            history_turns: 20,
            max_context_file_bytes: 12_000,
        }
    }
}

/// Outcome of [`Orchestrator::submit`](super::Orchestrator::submit)
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Plan mode: the agent's reply
    Reply {
        text: String,
        plan_state: PlanState,
        blueprint_updated: bool,
    },
    /// Build mode: a modification run was started
    RunStarted(PipelineHandle),
}

/// Cancellable handle on a spawned pipeline run
#[derive(Debug)]
pub struct PipelineHandle {
    pub run_id: RunId,
    cancel: CancellationToken,
    join: JoinHandle<PipelineRun>,
}

impl PipelineHandle {
    pub(crate) fn new(run_id: RunId, cancel: CancellationToken, join: JoinHandle<PipelineRun>) -> Self {
        Self {
            run_id,
            cancel,
            join,
        }
    }

    /// Request cancellation. In-flight model calls are aborted and nothing
    /// beyond the last committed stage is written.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<PipelineRun, OrchestratorError> {
        self.join
            .await
            .map_err(|e| OrchestratorError::TaskFailed(e.to_string()))
    }
}
