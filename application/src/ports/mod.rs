//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod capability_registry;
pub mod conversation_logger;
pub mod knowledge_store;
pub mod model_transport;
pub mod pipeline_progress;
pub mod workspace;
