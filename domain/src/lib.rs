//! Domain layer for avakin
//!
//! This crate contains the core entities, value objects and pure logic of the
//! multi-agent development pipeline. It has no dependencies on infrastructure
//! or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Plan mode / Build mode
//!
//! - **Plan mode**: the user converses with the Architect until a
//!   [`Blueprint`] is drafted and approved
//! - **Build mode**: the approved blueprint is scaffolded, coded, reviewed
//!   and validated by the agent roles, one [`PipelineRun`] at a time
//!
//! ## Dual-context retrieval
//!
//! Knowledge is stored per [`Scope`]: each project has an isolated store and
//! a single global store is consulted alongside it.
//!
//! ## Capabilities
//!
//! Plugins extend the host only through the capability interfaces in
//! [`plugin::capability`].

pub mod agent;
pub mod backend;
pub mod blueprint;
pub mod core;
pub mod knowledge;
pub mod plugin;
pub mod project;
pub mod prompt;
pub mod response;

// Re-export commonly used types
pub use agent::{
    pipeline::{PipelineRun, RunId, RunKind, RunLimits, StageRecord, TokenUsage},
    role::AgentRole,
    stage::{BuildStage, PlanState},
};
pub use backend::{BackendKind, ModelBackend, RoleBinding};
pub use blueprint::{
    Blueprint, BlueprintError, FilePlanEntry, parse_blueprint, validate_relative_path,
};
pub use core::{error::DomainError, string::truncate};
pub use knowledge::{
    chunking::{Chunker, ChunkingStrategy, TextSpan},
    entities::{Document, DocumentKind, KnowledgeChunk, RetrievedChunk},
    scope::{QueryScope, Scope},
    similarity::{cosine_similarity, rank_chunks},
    EmbeddingModelId,
};
pub use plugin::{
    capability::{
        AgentRoleProvider, Capability, IngesterProvider, ToolInvocation, ToolOutput, ToolProvider,
    },
    descriptor::{
        AgentRoleSection, EntryPoint, IngesterSection, PluginDescriptor, PluginState, ToolSection,
    },
    error::{PluginError, PluginValidationError},
};
pub use project::{
    conversation::{ConversationHistory, ConversationTurn, TurnOrigin, TurnRole},
    entities::{InteractionMode, Project, ProjectId},
    image::{ImageAttachment, MAX_IMAGE_BYTES},
    snapshot::{FileWrite, ProjectSnapshot},
};
pub use prompt::{GeneratedFile, PipelinePromptTemplate};
pub use response::{
    FileBrief, FileComment, ParseFailure, ReviewVerdict, ScaffoldPlan, TraceFrame,
    ValidationVerdict, clean_code_output, extract_json, parse_file_content, parse_review_verdict,
    parse_scaffold_plan, parse_traceback, parse_validation_verdict,
};
