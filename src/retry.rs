//! Fixed-delay bounded retry.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Budget for a freshly booted instance to start accepting SSH (about a minute).
    pub const SSH_CONNECT: RetryPolicy = RetryPolicy {
        attempts: 12,
        delay: Duration::from_secs(5),
    };

    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::SSH_CONNECT
    }
}

/// Returned by [`retry`] when every attempt failed.
#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    /// Error of the final attempt.
    pub last: anyhow::Error,
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempts: {:#}", self.attempts, self.last)
    }
}

/// Runs `op` until it succeeds or `policy.attempts` attempts have failed.
///
/// `op` receives the 1-based attempt number. The delay is only slept between
/// attempts, never after the last one.
pub fn retry<T, F>(policy: RetryPolicy, mut op: F) -> Result<T, Exhausted>
where
    F: FnMut(u32) -> anyhow::Result<T>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= attempts => {
                info!("Attempt {}/{} failed: {:#}", attempt, attempts, e);
                return Err(Exhausted { attempts, last: e });
            }
            Err(e) => {
                info!(
                    "Attempt {}/{} failed: {:#}; retrying in {}s",
                    attempt,
                    attempts,
                    e,
                    policy.delay.as_secs()
                );
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
                attempt += 1;
            }
        }
    }
}
