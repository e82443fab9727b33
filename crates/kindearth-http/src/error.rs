//! HTTP pipeline error types.

use thiserror::Error;

/// Error type for the request pipeline.
///
/// A response that arrived is never an error here, whatever its status;
/// callers inspect [`crate::HttpResponse::status`]. Errors mean no usable
/// response was produced.
#[derive(Error, Debug)]
pub enum HttpError {
    /// Could not connect to the backend
    #[error("Connection failed: {0}")]
    Connect(String),

    /// No response before the request timeout
    #[error("Request timed out")]
    Timeout,

    /// The request failed before a response was received
    #[error("Request failed: {0}")]
    Request(String),

    /// A response arrived but its body could not be read
    #[error("Failed to read response body: {0}")]
    Body(String),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid header name or value
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success status where the caller requires success
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// CSRF bootstrap gave up
    #[error("CSRF token fetch failed after {attempts} attempts: {last_error}")]
    CsrfExhausted { attempts: u32, last_error: String },

    /// Session refresh did not succeed
    #[error("Session refresh failed: {0}")]
    RefreshFailed(String),

    /// Invalid state transition in the CSRF bootstrap FSM
    #[error("Invalid CSRF bootstrap transition: {0}")]
    InvalidStateTransition(String),
}

impl HttpError {
    /// Returns true if no response was received at all.
    pub fn is_no_response(&self) -> bool {
        matches!(
            self,
            HttpError::Connect(_) | HttpError::Timeout | HttpError::Request(_)
        )
    }

    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - 5xx status codes
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Connect(_) | HttpError::Timeout => true,
            HttpError::Status(status) => (500..600).contains(status),
            _ => false,
        }
    }

    /// Classify an error returned by `reqwest` while sending a request.
    pub(crate) fn from_send_error(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            HttpError::Timeout
        } else if error.is_connect() {
            HttpError::Connect(error.to_string())
        } else if error.is_builder() {
            HttpError::Request(format!("invalid request: {}", error))
        } else {
            HttpError::Request(error.to_string())
        }
    }
}

/// Result type alias using HttpError.
pub type HttpResult<T> = Result<T, HttpError>;
