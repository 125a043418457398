use thiserror::Error;

/// Application-wide error types for the crawler worker.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned an unusable response.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Remote origin answered 429.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The privacy pipeline could not guarantee redaction. Never swallowed.
    #[error("Privacy pipeline error: {0}")]
    PrivacyError(String),

    /// Text could not be extracted from a downloaded document.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// Audit log write failed. Never swallowed.
    #[error("Audit log error: {0}")]
    AuditError(String),

    /// A job payload did not have the expected shape.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true for errors that must abort rather than degrade.
    pub fn is_fail_closed(&self) -> bool {
        matches!(self, AppError::PrivacyError(_) | AppError::AuditError(_))
    }
}
