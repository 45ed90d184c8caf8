//! Polite HTTP client: request pacing and retry with linear backoff

pub mod client;
pub mod errors;
pub mod pacing;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ClientConfig, PacedClient, DEFAULT_RETRY_WINDOW};
pub use errors::FetchError;
pub use pacing::{PacingPolicy, PacingState};
pub use transport::{HttpTransport, Request, Transport, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT};
