//! Service-level error type shared by the HTTP surface and its clients.

use thiserror::Error;

use crate::protocol::ErrorResponse;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::EncryptionFailure`] → 500
/// - [`ServiceError::KeyUnavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: invalid JSON, a non-object payload, or an empty field list.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Field encryption failed; the record must not be sent or stored.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// No key can be issued right now (issuing disabled or misconfigured).
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::EncryptionFailure(_) => 500,
            ServiceError::KeyUnavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code placed in [`ErrorResponse::code`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::EncryptionFailure(_) => "encryption_failed",
            ServiceError::KeyUnavailable(_) => "key_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Build the response body for this error.
    ///
    /// Encryption and internal failures are reported generically so that no
    /// detail about the failing field leaks to the caller.
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            ServiceError::BadRequest(m) | ServiceError::KeyUnavailable(m) => m.clone(),
            ServiceError::EncryptionFailure(_) => "request failed".to_owned(),
            ServiceError::Internal(_) => "internal error".to_owned(),
        };
        ErrorResponse::new(self.code(), message)
    }
}
