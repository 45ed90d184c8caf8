//! Request pacing
//!
//! Counter-based throttle: after every `n_delay` requests the next request waits
//! until `delay` has passed since the start of the pacing window.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

/// Default number of requests per pacing window
pub const DEFAULT_N_DELAY: u32 = 10;

/// Default minimum length of a pacing window
pub const DEFAULT_DELAY: Duration = Duration::from_secs(30);

/// How often and how long to pause between outbound requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    /// Requests allowed before a pause is enforced
    pub n_delay: u32,
    /// Minimum time between the start of a window and the request after it
    pub delay: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            n_delay: DEFAULT_N_DELAY,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Per-client pacing counters
#[derive(Debug, Default)]
pub struct PacingState {
    /// Requests issued since the last pause
    request_counter: u32,
    /// Start of the current pacing window
    previous_request_time: Option<Instant>,
}

impl PacingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the state machine for one request issued at `now`
    ///
    /// Returns how long the caller must sleep before sending, if at all.
    /// A pause nets the counter to zero without re-stamping the window start;
    /// the following request opens the next window.
    pub fn advance(&mut self, now: Instant, policy: &PacingPolicy) -> Option<Duration> {
        if self.request_counter == 0 {
            self.previous_request_time = Some(now);
            self.request_counter = 1;
            return None;
        }

        if self.request_counter >= policy.n_delay {
            self.request_counter = 0;
            let window_start = self.previous_request_time.unwrap_or(now);
            return policy
                .delay
                .checked_sub(now.saturating_duration_since(window_start))
                .filter(|sleep| !sleep.is_zero());
        }

        self.request_counter += 1;
        None
    }

    /// Wait for this request's turn, sleeping if the window is used up
    pub async fn wait_turn(&mut self, policy: &PacingPolicy) {
        if let Some(sleep_time) = self.advance(Instant::now(), policy) {
            info!(
                seconds = sleep_time.as_secs_f64(),
                "Sleeping request for pacing"
            );
            tokio::time::sleep(sleep_time).await;
        }
    }

    /// Requests issued since the last pause
    pub fn request_counter(&self) -> u32 {
        self.request_counter
    }
}
