//! Paced HTTP Client
//!
//! Wraps every outbound request in two throttles: a pacing window that pauses
//! after every `n_delay` requests, and a linear-backoff retry loop for transient
//! network failures.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::errors::FetchError;
use super::pacing::{PacingPolicy, PacingState};
use super::transport::{HttpTransport, Request, Transport, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT};

/// Default time spent retrying transient failures before the final attempt
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Pacing and retry settings for a [`PacedClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Pause policy applied before each request
    pub pacing: PacingPolicy,
    /// How long transient failures are retried before one last attempt
    pub retry_window: Duration,
    /// Socket timeout for a single HTTP call
    pub request_timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pacing: PacingPolicy::default(),
            retry_window: DEFAULT_RETRY_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// HTTP client that paces and retries every request
///
/// Clones share the same pacing state; a call holds it for its whole
/// pacing and retry sequence, so calls through any clone are serialized.
pub struct PacedClient<T: Transport = HttpTransport> {
    /// Where requests actually go
    transport: Arc<T>,
    /// Pacing and retry settings
    config: ClientConfig,
    /// Shared pacing counters
    pacing: Arc<Mutex<PacingState>>,
}

impl<T: Transport> Clone for PacedClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            pacing: Arc::clone(&self.pacing),
        }
    }
}

impl PacedClient<HttpTransport> {
    /// Create a client backed by a real HTTP transport
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let transport = HttpTransport::new(config.request_timeout, config.user_agent.clone())?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> PacedClient<T> {
    /// Create a client over an arbitrary transport
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            pacing: Arc::new(Mutex::new(PacingState::new())),
        }
    }

    /// Client settings
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// GET `url` and return the full body
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.download(&Request::get(url), || Ok(Vec::new())).await
    }

    /// POST a form `body` to `url` and return the full response body
    pub async fn post(&self, url: &str, body: &str) -> Result<Vec<u8>, FetchError> {
        self.download(&Request::post_form(url, body), || Ok(Vec::new()))
            .await
    }

    /// Send `request`, streaming the response into a sink from `make_sink`
    ///
    /// Every attempt gets a fresh sink, so bytes from a failed attempt never
    /// leak into the result. Failing to create a sink is not retried.
    ///
    /// # Returns
    /// The sink that received the successful response
    pub async fn download<W, F>(&self, request: &Request, mut make_sink: F) -> Result<W, FetchError>
    where
        W: Write + Send,
        F: FnMut() -> Result<W, FetchError>,
    {
        let mut pacing = self.pacing.lock().await;
        pacing.wait_turn(&self.config.pacing).await;

        let first_attempt = Instant::now();
        let mut elapsed = Duration::ZERO;

        while elapsed < self.config.retry_window {
            match self.attempt(request, &mut make_sink).await {
                Ok(sink) => return Ok(sink),
                Err(e) if e.is_transient() => {
                    elapsed = first_attempt.elapsed();
                    log_retry(&request.url, elapsed, &e);
                    // Linear backoff: wait as long as we have already been trying
                    tokio::time::sleep(elapsed).await;
                }
                Err(e) => return Err(e),
            }
        }

        debug!(url = %request.url, "Retry window exhausted, making final attempt");
        self.attempt(request, &mut make_sink).await
    }

    /// One attempt against a freshly created sink
    async fn attempt<W, F>(&self, request: &Request, make_sink: &mut F) -> Result<W, FetchError>
    where
        W: Write + Send,
        F: FnMut() -> Result<W, FetchError>,
    {
        let mut sink = make_sink()?;
        self.transport.send(request, &mut sink).await?;
        Ok(sink)
    }
}

/// Log a transient failure with severity growing with time spent retrying
fn log_retry(url: &str, elapsed: Duration, err: &FetchError) {
    let secs = elapsed.as_secs();
    if secs <= 60 {
        debug!(url = %url, elapsed = ?elapsed, error = %err, "Could not connect, trying again");
    } else if secs <= 5 * 60 {
        info!(url = %url, elapsed = ?elapsed, error = %err, "Could not connect, trying again");
    } else if secs <= 60 * 60 {
        warn!(url = %url, elapsed = ?elapsed, error = %err, "Could not connect, trying again");
    } else {
        error!(url = %url, elapsed = ?elapsed, error = %err, "Could not connect, trying again");
    }
}
