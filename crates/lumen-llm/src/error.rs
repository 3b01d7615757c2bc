use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("{provider} API error (status {status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("embedding count mismatch: sent {expected} inputs, received {actual} vectors")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Client errors (4xx other than 429), malformed payloads and cancellation
    /// are final.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status >= 500,
            Self::Json(_) | Self::Cancelled | Self::EmbeddingCount { .. } => false,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = LlmError::Api {
            provider: "openai",
            status: 503,
            message: "overloaded".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_final() {
        let err = LlmError::Api {
            provider: "openai",
            status: 401,
            message: "bad key".into(),
        };
        assert!(!err.is_retryable());
        assert!(!LlmError::Cancelled.is_retryable());
    }

    #[test]
    fn rate_limit_and_timeout_retry() {
        assert!(LlmError::RateLimited.is_retryable());
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn timeout_message_in_millis() {
        let msg = LlmError::Timeout(Duration::from_millis(1500)).to_string();
        assert_eq!(msg, "request timed out after 1500ms");
    }
}
