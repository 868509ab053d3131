//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Pipeline run already finished ({0})")]
    RunFinished(String),

    #[error("Token budget exceeded: used {used} of {limit}")]
    BudgetExceeded { used: u64, limit: u64 },

    #[error("Invalid project: {0}")]
    InvalidProject(String),

    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_error_display() {
        let error = DomainError::Cancelled;
        assert_eq!(error.to_string(), "Operation cancelled");
        assert!(error.is_cancelled());
    }

    #[test]
    fn test_invalid_transition_display() {
        let error = DomainError::InvalidTransition {
            from: "Done".to_string(),
            to: "Coding".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid stage transition: Done -> Coding");
        assert!(!error.is_cancelled());
    }
}
