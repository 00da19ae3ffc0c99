// Request policy: one rate-limit gate wrapped around a bounded retry loop.
//
// Every outbound Sunsynk call goes through the same `RequestPolicy`, so
// the aggregate request rate stays under the upstream budget no matter how
// many logical operations are in flight. Retries take a permit too.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::Error;

// ── RateLimiter ──────────────────────────────────────────────────────

/// Permit gate over a rolling time window.
///
/// Grants at most `max_permits` acquisitions within any `window`-long
/// span. Callers past the budget sleep until the oldest permit in the
/// window expires.
#[derive(Debug)]
pub struct RateLimiter {
    max_permits: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `permits` per rolling second. Zero is treated as one.
    pub fn per_second(permits: u32) -> Self {
        Self::with_window(permits, Duration::from_secs(1))
    }

    pub fn with_window(permits: u32, window: Duration) -> Self {
        let max_permits = usize::try_from(permits.max(1)).unwrap_or(usize::MAX);
        Self {
            max_permits,
            window,
            issued: Mutex::new(VecDeque::with_capacity(max_permits)),
        }
    }

    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Wait for a permit.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut issued = self.issued.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = issued.front() {
                    if now.duration_since(oldest) >= self.window {
                        issued.pop_front();
                    } else {
                        break;
                    }
                }
                if issued.len() < self.max_permits {
                    issued.push_back(now);
                    return;
                }
                issued
                    .front()
                    .map_or(Duration::ZERO, |&oldest| {
                        self.window.saturating_sub(now.duration_since(oldest))
                    })
            };
            trace!(?wait, "rate limit budget spent, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

// ── RetryPolicy ──────────────────────────────────────────────────────

/// Bounded attempts with a linearly growing pause between them.
///
/// The pause after attempt `i` (zero-based) is `(i + 1) * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        self.base_delay.saturating_mul(attempt_index.saturating_add(1))
    }
}

// ── RequestPolicy ────────────────────────────────────────────────────

/// The limiter and the retry loop as one reusable object.
#[derive(Debug)]
pub struct RequestPolicy {
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl RequestPolicy {
    pub fn new(limiter: RateLimiter, retry: RetryPolicy) -> Self {
        Self { limiter, retry }
    }

    /// Run `call` exactly once behind the rate limit.
    pub async fn once<F, Fut, T>(&self, call: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.limiter.acquire().await;
        call().await
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. Each attempt waits for its own permit.
    pub async fn retrying<F, Fut, T>(&self, what: &str, mut call: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            self.limiter.acquire().await;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    debug!(what, error = %e, "non-retryable failure");
                    return Err(e);
                }
                Err(e) if attempt + 1 >= attempts => {
                    warn!(what, attempts, error = %e, "giving up after retries");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        what,
                        attempt = attempt + 1,
                        attempts,
                        ?delay,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::new(RateLimiter::per_second(20), RetryPolicy::default())
    }
}
