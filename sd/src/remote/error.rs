//! Remote service error types

use thiserror::Error;

/// Errors from calls to external services
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RemoteError {
    /// Check if a later cycle may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::ApiError { status, .. } => *status >= 500 || *status == 401 || *status == 429,
            RemoteError::Network(_) => true,
            RemoteError::InvalidResponse(_) => false,
            RemoteError::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(
            RemoteError::ApiError {
                status: 503,
                message: "unavailable".to_string()
            }
            .is_retryable()
        );

        // An expired token is fixed by the next refresh
        assert!(
            RemoteError::ApiError {
                status: 401,
                message: "expired".to_string()
            }
            .is_retryable()
        );

        assert!(
            !RemoteError::ApiError {
                status: 404,
                message: "missing".to_string()
            }
            .is_retryable()
        );

        assert!(!RemoteError::InvalidResponse("no bindings".to_string()).is_retryable());
    }
}
