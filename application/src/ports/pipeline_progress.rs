//! Pipeline progress port.
//!
//! [`PipelineProgressNotifier`] is an **output port** that the presentation
//! layer implements to display Plan-mode and Build-mode progress. All
//! callback argument types come from the domain layer.
//!
//! All methods have default no-op implementations, so implementers only
//! need to override the callbacks they care about.

use avakin_domain::{AgentRole, BuildStage, ParseFailure, PipelineRun, PlanState, RunId, RunKind};

pub trait PipelineProgressNotifier: Send + Sync {
    /// Plan-mode state changed
    fn on_plan_state(&self, _state: PlanState) {}

    /// A Build-mode run was started
    fn on_run_start(&self, _run_id: &RunId, _kind: &RunKind) {}

    /// The run entered a new stage
    fn on_stage_change(&self, _stage: BuildStage) {}

    /// A model call is about to be made for `role`
    fn on_model_call(&self, _role: &AgentRole, _backend: &str) {}

    /// A transport failure is being retried
    fn on_retry(&self, _backend: &str, _attempt: usize, _max_retries: usize, _error: &str) {}

    /// The primary backend was unavailable and the fallback is used
    fn on_fallback(&self, _role: &AgentRole, _from: &str, _to: &str) {}

    /// A response failed to parse and is being re-prompted once
    fn on_parse_retry(&self, _stage: BuildStage, _failure: &ParseFailure) {}

    /// A file was generated (not yet committed)
    fn on_file_generated(&self, _path: &str) {}

    /// A stage's writes were committed to the project tree
    fn on_files_committed(&self, _paths: &[String]) {}

    /// The reviewer requested revisions on these files
    fn on_revision(&self, _attempt: usize, _max: usize, _files: &[String]) {}

    /// A tool plugin finished during validation
    fn on_tool_result(&self, _tool: &str, _success: bool) {}

    /// The run reached Done or Failed
    fn on_run_complete(&self, _run: &PipelineRun) {}
}

/// No-op implementation
pub struct NoPipelineProgress;

impl PipelineProgressNotifier for NoPipelineProgress {}
