//! Request pacing and retries shared by the HTTP clients.

use std::time::Duration;

use tokio::{
    sync::{Mutex, Semaphore, SemaphorePermit},
    time::Instant,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt + 1`, given `attempt` failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPolicy {
    /// Minimum spacing between two dispatched requests.
    pub interval: Duration,
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2500),
            max_concurrent: 1,
            retry: RetryPolicy::default(),
        }
    }
}

impl RequestPolicy {
    pub fn unthrottled() -> Self {
        Self {
            interval: Duration::ZERO,
            max_concurrent: Semaphore::MAX_PERMITS,
            retry: RetryPolicy::none(),
        }
    }
}

/// Errors that may go away when the request is sent again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

pub struct Throttle {
    policy: RequestPolicy,
    next_slot: Mutex<Option<Instant>>,
    permits: Semaphore,
}

impl Throttle {
    pub fn new(policy: RequestPolicy) -> Self {
        let permits = Semaphore::new(policy.max_concurrent.clamp(1, Semaphore::MAX_PERMITS));
        Self {
            policy,
            next_slot: Mutex::new(None),
            permits,
        }
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    /// Wait for a dispatch slot. Slots are handed out `interval` apart; the
    /// permit bounds how many requests are in flight.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("throttle semaphore is never closed");
        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next_slot.map_or(now, |next| next.max(now));
            *next_slot = Some(slot + self.policy.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
        permit
    }

    /// Send a request through the throttle, retrying retryable failures with
    /// exponential backoff.
    pub async fn run<F, Fut, T, E>(&self, mut request: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            let result = {
                let _permit = self.acquire().await;
                request().await
            };
            match result {
                Err(error) if error.is_retryable() && attempt < self.policy.retry.max_attempts => {
                    let backoff = self.policy.retry.backoff(attempt);
                    warn!(%error, attempt, ?backoff, "request failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => {
                    debug!(attempt, ok = result.is_ok(), "request finished");
                    return result;
                }
            }
        }
    }
}
