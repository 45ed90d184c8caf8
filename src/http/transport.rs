//! Outbound HTTP transport
//!
//! The [`Transport`] trait is the single seam through which requests leave the process.
//! [`HttpTransport`] is the reqwest-backed implementation used outside of tests.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use tracing::debug;

use super::errors::FetchError;

/// Per-call HTTP timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// User-Agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!(
    "overpass-fetch/",
    env!("CARGO_PKG_VERSION"),
    " (OpenStreetMap import tooling)"
);

/// A single outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    /// Optional body with its content type
    pub body: Option<(String, String)>,
}

impl Request {
    /// A GET request for `url`
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
        }
    }

    /// A POST request carrying an url-encoded form body
    pub fn post_form(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some((
                body.into(),
                "application/x-www-form-urlencoded".to_string(),
            )),
        }
    }
}

/// Sends a request and streams the successful response body into a sink
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, writing the body into `sink`
    ///
    /// # Returns
    /// Number of body bytes written
    async fn send(
        &self,
        request: &Request,
        sink: &mut (dyn Write + Send),
    ) -> Result<u64, FetchError>;
}

/// reqwest-backed transport with a fixed socket timeout
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP client for making requests
    http_client: Client,
    /// Value of the User-Agent header
    user_agent: String,
}

impl HttpTransport {
    /// Create a transport with the given per-call timeout and User-Agent
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            user_agent: user_agent.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &Request,
        sink: &mut (dyn Write + Send),
    ) -> Result<u64, FetchError> {
        let url = request.url.as_str();
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .http_client
            .request(request.method.clone(), url)
            .header(USER_AGENT, &self.user_agent);

        if let Some((body, content_type)) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, content_type)
                .body(body.clone());
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(url = %url, status = %status, error = %e, "Failed to read error response body");
                    String::new()
                }
            };
            return Err(FetchError::from_status(url, status.as_u16(), &body));
        }

        // Stream chunk by chunk so large responses never sit in memory twice
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?
        {
            sink.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        sink.flush()?;

        debug!(url = %url, bytes = written, "Received response");
        Ok(written)
    }
}
