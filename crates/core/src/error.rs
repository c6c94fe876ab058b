use thiserror::Error;

use crate::alert::AlertStatus;

#[derive(Error, Debug)]
pub enum AlertError {
    /// Malformed input: bad condition tree, unknown status value, invalid rule.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// No established actor identity for a mutating call.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Store call '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl AlertError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        AlertError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Store failures and timeouts may succeed on the next run.
    pub fn is_transient(&self) -> bool {
        matches!(self, AlertError::Store(_) | AlertError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, AlertError>;
