//! Error types for the campus assistant core

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Health probe error: {0}")]
    ProbeError(String),

    #[error("Backend authorization rejected: {0}")]
    Unauthorized(String),

    #[error("Enhancement error: {0}")]
    EnhancementError(String),

    #[error("Enhancement deadline exceeded after {0} ms")]
    EnhancementTimeout(u64),

    #[error("Agent error: {0}")]
    AgentError(String),

    #[error("Malformed context: {0}")]
    InvalidContext(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AssistantError {
    /// Whether the retry layer may re-attempt the failed operation.
    ///
    /// Authorization rejections and contract errors are final; retrying
    /// them only delays the inevitable and can lock accounts out.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AssistantError::Unauthorized(_) | AssistantError::InvalidContext(_)
        )
    }
}
