//! ClawJobs error types.

use thiserror::Error;

/// Unified error for every ClawJobs crate.
#[derive(Debug, Error)]
pub enum ClawJobsError {
    /// Something the user has to fix before a job can ever succeed
    /// (e.g. no API key). Never retried.
    #[error("{0}")]
    Configuration(String),

    /// Non-2xx response from the completion API.
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// Network failure, timeout or unusable response body.
    #[error("{0}")]
    Transport(String),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid task: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClawJobsError {
    /// Whether the host job system should re-run the whole invocation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClawJobsError::Http { .. } | ClawJobsError::Transport(_) | ClawJobsError::Database(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClawJobsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = ClawJobsError::Http {
            status: 400,
            detail: "max_tokens: field required".into(),
        };
        assert_eq!(err.to_string(), "HTTP 400: max_tokens: field required");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_configuration_not_retryable() {
        let err = ClawJobsError::Configuration("API key not configured".into());
        assert!(!err.is_retryable());
        assert!(!ClawJobsError::TaskNotFound(7).is_retryable());
    }
}
