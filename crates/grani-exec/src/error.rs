//! Error handling for backend drivers.

use thiserror::Error;

/// Result type for driver operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors produced by backend drivers.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The job's `executor_config` is missing or malformed.
    #[error("invalid executor config: {0}")]
    ConfigInvalid(String),

    /// The requested executor is not configured in this deployment.
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    /// The backend object does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend unreachable, 5xx, or timed out; safe to retry.
    #[error("transient backend error: {0}")]
    Transient(String),

    /// Backend rejected the request (4xx other than 404/409).
    #[error("backend rejected request ({status}): {message}")]
    Permanent { status: u16, message: String },

    /// Credential or kubeconfig problem.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Malformed backend response.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ExecError {
    /// Whether the orchestrator should keep the job queued and retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecError::Transient(_))
    }

    /// Classify an HTTP failure status into the driver error taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 404 {
            ExecError::NotFound(message)
        } else if status >= 500 {
            ExecError::Transient(format!("backend returned {status}: {message}"))
        } else {
            ExecError::Permanent { status, message }
        }
    }
}

impl From<reqwest::Error> for ExecError {
    fn from(e: reqwest::Error) -> Self {
        // Connection failures and timeouts are retryable; anything that
        // produced a status code is classified by the caller via
        // `from_status` before the response body is consumed.
        ExecError::Transient(e.to_string())
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(e: serde_json::Error) -> Self {
        ExecError::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(ExecError::from_status(404, "gone"), ExecError::NotFound(_)));
        assert!(ExecError::from_status(503, "busy").is_transient());
        assert!(ExecError::from_status(500, "boom").is_transient());
        assert!(matches!(
            ExecError::from_status(422, "bad spec"),
            ExecError::Permanent { status: 422, .. }
        ));
        assert!(!ExecError::from_status(403, "denied").is_transient());
    }
}
