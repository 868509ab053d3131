//! Agent domain module
//!
//! Contains agent roles, the Plan/Build stage machines and the
//! [`PipelineRun`](pipeline::PipelineRun) entity.

pub mod pipeline;
pub mod role;
pub mod stage;

pub use pipeline::{PipelineRun, RunId, RunKind, RunLimits, StageRecord, TokenUsage};
pub use role::AgentRole;
pub use stage::{BuildStage, PlanState};
