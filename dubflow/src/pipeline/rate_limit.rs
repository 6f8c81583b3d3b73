//! Cooperative inter-call rate limiting for API-bound stages.

use crate::config::RateLimitPolicy;
use std::time::{Duration, Instant};

/// Serializes API-bound stage invocations behind a minimum inter-call delay.
///
/// The gate is cooperative: callers await [`RateGate::acquire`] before each
/// API-bound cell and the gate sleeps out the remainder of the configured
/// delay since the previous acquisition. The first acquisition never waits.
#[derive(Debug)]
pub struct RateGate {
    policy: RateLimitPolicy,
    last_acquired: Option<Instant>,
    api_calls: u64,
    total_wait: Duration,
}

impl RateGate {
    /// Creates a gate driven by the given policy.
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            last_acquired: None,
            api_calls: 0,
            total_wait: Duration::ZERO,
        }
    }

    /// The wait the gate would impose if acquired at `now`.
    ///
    /// Pure decision logic; [`RateGate::acquire`] applies it.
    #[must_use]
    pub fn pending_wait(&self, now: Instant) -> Duration {
        if !self.policy.is_enabled() {
            return Duration::ZERO;
        }
        match self.last_acquired {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                self.policy.delay.saturating_sub(elapsed)
            }
        }
    }

    /// Waits out the inter-call delay, then records the acquisition.
    ///
    /// Returns the time actually waited.
    pub async fn acquire(&mut self) -> Duration {
        let wait = self.pending_wait(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit wait");
            tokio::time::sleep(wait).await;
        }
        self.last_acquired = Some(Instant::now());
        self.api_calls += 1;
        self.total_wait += wait;
        wait
    }

    /// Number of acquisitions so far.
    #[must_use]
    pub fn api_calls(&self) -> u64 {
        self.api_calls
    }

    /// Accumulated wait time across all acquisitions.
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }
}
