//! Pipeline tunables from TOML (`[pipeline]` section)

use avakin_application::PipelineSettings;
use avakin_domain::RunLimits;
use serde::{Deserialize, Serialize};

/// # Example
///
/// ```toml
/// [pipeline]
/// max_review_revisions = 2
/// max_fix_attempts = 3
/// token_budget = 200000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePipelineConfig {
    pub max_review_revisions: usize,
    pub max_fix_attempts: usize,
    /// Cumulative tokens per run; unset means unlimited
    pub token_budget: Option<u64>,
    /// Knowledge chunks retrieved per stage (0 disables retrieval)
    pub context_chunks: usize,
    pub include_global: bool,
    pub history_turns: usize,
    pub max_context_file_bytes: usize,
}

impl Default for FilePipelineConfig {
    fn default() -> Self {
        let settings = PipelineSettings::default();
        Self {
            max_review_revisions: settings.limits.max_review_revisions,
            max_fix_attempts: settings.limits.max_fix_attempts,
            token_budget: settings.limits.token_budget,
            context_chunks: settings.context_chunks,
            include_global: settings.include_global,
            history_turns: settings.history_turns,
            max_context_file_bytes: settings.max_context_file_bytes,
        }
    }
}

impl FilePipelineConfig {
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            limits: RunLimits {
                max_review_revisions: self.max_review_revisions,
                max_fix_attempts: self.max_fix_attempts,
                token_budget: self.token_budget,
            },
            context_chunks: self.context_chunks,
            include_global: self.include_global,
            history_turns: self.history_turns,
            max_context_file_bytes: self.max_context_file_bytes,
        }
    }
}
