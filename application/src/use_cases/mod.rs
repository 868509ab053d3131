//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod model_router;
pub mod orchestrator;
