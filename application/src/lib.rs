//! Application layer for avakin
//!
//! This crate contains the model router, the pipeline orchestrator and the
//! port definitions the infrastructure layer implements.
//! It depends only on the domain layer.

pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use ports::{
    capability_registry::{CapabilityRegistryPort, NoCapabilities, RoleLease, RoleLeases, lease_set},
    conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger},
    knowledge_store::{Embedder, IngestReport, KnowledgeError, KnowledgeStorePort, NoKnowledge},
    model_transport::{ModelRequest, ModelResponse, ModelTransport, TransportError},
    pipeline_progress::{NoPipelineProgress, PipelineProgressNotifier},
    workspace::{WorkspaceError, WorkspacePort},
};
pub use use_cases::model_router::{
    ModelRouter, RetryPolicy, RoleInvocation, RouterConfig, RouterError, RunGuard,
};
pub use use_cases::orchestrator::{
    Orchestrator, OrchestratorError, PipelineHandle, PipelineSettings, SubmitOutcome,
};
