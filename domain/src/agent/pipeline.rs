//! Pipeline run entity
//!
//! A [`PipelineRun`] is the live execution of one Build-mode request. It is
//! owned exclusively by the orchestrator for its duration and enforces the
//! stage machine of [`BuildStage`] plus the bounded revision/fix counters
//! that guarantee termination.

use super::stage::BuildStage;
use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Identifier of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What started the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// First build of an approved blueprint
    Build,
    /// A Build-mode modification request
    Modify { request: String },
    /// "Review & Fix" with an error traceback
    Fix { traceback: String },
}

impl RunKind {
    /// Stage the run is entered at
    pub fn initial_stage(&self) -> BuildStage {
        match self {
            RunKind::Build | RunKind::Modify { .. } => BuildStage::Scaffolding,
            RunKind::Fix { .. } => BuildStage::Reviewing,
        }
    }
}

/// Token counts reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Bounds applied to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Reviewing -> Coding back-edges allowed
    pub max_review_revisions: usize,
    /// Validating -> Coding back-edges allowed
    pub max_fix_attempts: usize,
    /// Cumulative token budget (None = unlimited)
    pub token_budget: Option<u64>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_review_revisions: 2,
            max_fix_attempts: 3,
            token_budget: None,
        }
    }
}

/// Output of one executed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: BuildStage,
    pub summary: String,
    /// Paths committed by this stage (Coding only)
    pub files_written: Vec<String>,
    pub usage: TokenUsage,
}

impl StageRecord {
    pub fn new(stage: BuildStage, summary: impl Into<String>) -> Self {
        Self {
            stage,
            summary: summary.into(),
            files_written: Vec::new(),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_written = files;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Live execution of one Build-mode request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub kind: RunKind,
    pub stage: BuildStage,
    pub records: Vec<StageRecord>,
    pub usage: TokenUsage,
    pub limits: RunLimits,
    pub revision_count: usize,
    pub fix_attempts: usize,
    pub cancelled: bool,
    pub last_error: Option<String>,
    /// Stage that was executing when the run failed
    pub failed_stage: Option<BuildStage>,
}

impl PipelineRun {
    pub fn new(id: RunId, kind: RunKind, limits: RunLimits) -> Self {
        let stage = kind.initial_stage();
        Self {
            id,
            kind,
            stage,
            records: Vec::new(),
            usage: TokenUsage::default(),
            limits,
            revision_count: 0,
            fix_attempts: 0,
            cancelled: false,
            last_error: None,
            failed_stage: None,
        }
    }

    /// Move to the next stage, enforcing the stage machine
    pub fn advance(&mut self, next: BuildStage) -> Result<(), DomainError> {
        if !self.stage.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        self.stage = next;
        Ok(())
    }

    /// Take one Reviewing -> Coding back-edge if the bound allows it
    pub fn try_begin_revision(&mut self) -> bool {
        if self.revision_count >= self.limits.max_review_revisions {
            return false;
        }
        self.revision_count += 1;
        true
    }

    /// Take one Validating -> Coding back-edge if the bound allows it
    pub fn try_begin_fix(&mut self) -> bool {
        if self.fix_attempts >= self.limits.max_fix_attempts {
            return false;
        }
        self.fix_attempts += 1;
        true
    }

    /// Accumulate usage, failing once the budget is exceeded
    pub fn add_usage(&mut self, usage: TokenUsage) -> Result<(), DomainError> {
        self.usage.add(usage);
        match self.limits.token_budget {
            Some(limit) if self.usage.total() > limit => Err(DomainError::BudgetExceeded {
                used: self.usage.total(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    pub fn record(&mut self, record: StageRecord) {
        self.records.push(record);
    }

    /// Transition to Failed, remembering the stage and error
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.stage.is_terminal() {
            return;
        }
        self.failed_stage = Some(self.stage);
        self.last_error = Some(error.into());
        self.stage = BuildStage::Failed;
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.fail("cancelled");
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }

    /// All paths written over the whole run, in commit order, de-duplicated
    pub fn files_written(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for path in self.records.iter().flat_map(|r| r.files_written.iter()) {
            if !seen.contains(path) {
                seen.push(path.clone());
            }
        }
        seen
    }
}
