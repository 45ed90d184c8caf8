//! Scripted transport for tests
//!
//! [`ScriptedTransport`] replays a fixed sequence of outcomes without touching the
//! network, counting every attempt so tests can assert how often the wire was hit.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::errors::FetchError;
use super::transport::{Request, Transport};

/// Outcome of one scripted attempt
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Respond with this body
    Body(Vec<u8>),
    /// Write some bytes, then fail as if the connection dropped mid-body
    Transient,
    /// Fail with a non-retryable HTTP status
    Status(u16),
}

/// Replays outcomes in order, repeating the last one once the script runs out
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Outcome>>>,
    last: Arc<Mutex<Outcome>>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Request>>>,
    latency: Duration,
}

impl ScriptedTransport {
    /// Replay `outcomes` in order
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        let last = outcomes.last().cloned().unwrap_or(Outcome::Transient);
        Self {
            script: Arc::new(Mutex::new(outcomes.into())),
            last: Arc::new(Mutex::new(last)),
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            latency: Duration::ZERO,
        }
    }

    /// Always respond with `body`
    pub fn ok(body: &[u8]) -> Self {
        Self::new(vec![Outcome::Body(body.to_vec())])
    }

    /// Fail transiently `failures` times, then respond with `body`
    pub fn flaky(failures: usize, body: &[u8]) -> Self {
        let mut outcomes = vec![Outcome::Transient; failures];
        outcomes.push(Outcome::Body(body.to_vec()));
        Self::new(outcomes)
    }

    /// Spend `latency` of (virtual) time on every attempt
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of attempts made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> Outcome {
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(outcome) => {
                *self.last.lock().unwrap() = outcome.clone();
                outcome
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &Request,
        sink: &mut (dyn Write + Send),
    ) -> Result<u64, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let outcome = self.next_outcome();

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match outcome {
            Outcome::Body(body) => {
                sink.write_all(&body)?;
                Ok(body.len() as u64)
            }
            Outcome::Transient => {
                sink.write_all(b"<partial")?;
                Err(FetchError::Body {
                    url: request.url.clone(),
                    message: "connection closed before message completed".to_string(),
                })
            }
            Outcome::Status(status) => Err(FetchError::from_status(&request.url, status, "")),
        }
    }
}
