//! Error types for store operations

use thiserror::Error;

/// Errors raised by the store before any state is touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Required field missing or empty; retrying the same request won't help
    #[error("{message}")]
    Validation { message: String },

    /// A referenced entity does not exist
    #[error("{message}")]
    NotFound { message: String },
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// HTTP status used by the REST routes
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::Validation { .. } => 400,
            StoreError::NotFound { .. } => 404,
        }
    }
}
