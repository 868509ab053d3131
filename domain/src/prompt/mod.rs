//! Prompt domain
//!
//! Role-specific prompt templates for each Plan-mode and Build-mode stage.

mod template;

pub use template::{GeneratedFile, PipelinePromptTemplate};
