//! HTTP Fetch Error Types
//!
//! Structured error handling for outbound requests.
//! Splits failures into transient (retried with backoff) and permanent (surfaced at once).

/// Errors produced by a single outbound request attempt
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Network error contacting {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Response body from {url} was cut short: {message}")]
    Body { url: String, message: String },

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Request error: {0}")]
    Request(String),

    #[error("Failed to write response: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether this error is expected to resolve on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Network { .. } | FetchError::Timeout { .. } | FetchError::Body { .. }
        )
    }

    /// Create a FetchError from a non-success HTTP status and response body
    pub fn from_status(url: &str, status: u16, body: &str) -> Self {
        FetchError::Status {
            url: url.to_string(),
            status,
            body: body.to_string(),
        }
    }

    /// Classify a reqwest error raised while sending or reading a response
    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return FetchError::from_status(url, status.as_u16(), &error.to_string());
        }
        if error.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
            };
        }
        if error.is_body() || error.is_decode() {
            return FetchError::Body {
                url: url.to_string(),
                message: error.to_string(),
            };
        }
        if error.is_builder() || error.is_redirect() {
            return FetchError::Request(error.to_string());
        }
        // Connection refused, reset, DNS failure and friends
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
