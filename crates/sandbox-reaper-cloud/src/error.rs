//! Cloud API error classification
//!
//! Provides typed errors for the provider's REST APIs so the engine can
//! distinguish "already gone" and "region broken" from genuine failures
//! instead of string-matching response bodies at call sites.

use thiserror::Error;

pub type CloudResult<T> = Result<T, CloudError>;

/// Error categories for cloud API operations
#[derive(Debug, Error)]
pub enum CloudError {
    /// Credential exchange or token refresh failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Resource was not found (safe to treat as already deleted)
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The regional endpoint is unavailable (listing treats this as empty)
    #[error("region endpoint unavailable")]
    RegionUnavailable,

    /// Rate limit exceeded (retryable)
    #[error("rate limit exceeded")]
    Throttled,

    /// The resource still has dependents or is mid-transition (retryable)
    #[error("resource conflict: {0}")]
    Conflict(String),

    /// Any other API error with status code and message
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (DNS, TLS, connect, body read)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn is_region_unavailable(&self) -> bool {
        matches!(self, CloudError::RegionUnavailable)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CloudError::Throttled | CloudError::Conflict(_))
    }
}

/// Classify an HTTP error response by status code.
///
/// 502 is how the provider signals a region whose service is down, observed
/// on listing calls; the engine maps it to an empty result.
pub fn classify_status(status: u16, message: impl Into<String>) -> CloudError {
    let message = message.into();
    match status {
        401 | 403 => CloudError::Auth(message),
        404 | 410 => CloudError::NotFound(message),
        409 => CloudError::Conflict(message),
        429 => CloudError::Throttled,
        502 => CloudError::RegionUnavailable,
        _ => CloudError::Api { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_statuses() {
        assert!(classify_status(404, "gone").is_not_found());
        assert!(classify_status(410, "gone").is_not_found());
        assert!(!classify_status(500, "boom").is_not_found());
    }

    #[test]
    fn test_region_unavailable() {
        assert!(classify_status(502, "bad gateway").is_region_unavailable());
        assert!(!classify_status(503, "busy").is_region_unavailable());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(classify_status(429, "slow down").is_retryable());
        assert!(classify_status(409, "in use").is_retryable());
        assert!(!classify_status(404, "gone").is_retryable());
        assert!(!classify_status(500, "boom").is_retryable());
    }

    #[test]
    fn test_auth_statuses() {
        assert!(matches!(classify_status(401, "nope"), CloudError::Auth(_)));
        assert!(matches!(classify_status(403, "nope"), CloudError::Auth(_)));
    }

    #[test]
    fn test_other_statuses_keep_code() {
        match classify_status(500, "boom") {
            CloudError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
