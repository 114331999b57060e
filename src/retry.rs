//! Exponential backoff with jitter for outbound provider calls.

use crate::error::{DispatchError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

/// Retry policy applied per outbound provider call.
///
/// A call is re-attempted on transport failures without an HTTP status, on
/// failures whose status is in [`statuses`](Self::statuses), and on
/// per-attempt timeouts. Every other failure is terminal for that call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Master switch; a disabled policy performs a single attempt.
    pub enabled: bool,
    /// Maximum attempts, including the initial call.
    pub max_attempts: u32,
    /// Base delay in milliseconds; doubled on each subsequent attempt.
    pub base_sleep_ms: u64,
    /// Upper bound on the computed delay, in milliseconds.
    pub max_sleep_ms: u64,
    /// Draw the actual delay uniformly from `[delay/2, delay]`.
    pub jitter: bool,
    /// HTTP statuses considered transient.
    pub statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_sleep_ms: 200,
            max_sleep_ms: 2000,
            jitter: true,
            statuses: default_statuses(),
        }
    }
}

impl RetryPolicy {
    /// Compute the deterministic backoff for the given 1-based `attempt`:
    /// `min(max_sleep, base * 2^(attempt - 1))`, with saturating arithmetic.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_sleep_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        Duration::from_millis(exp.min(self.max_sleep_ms))
    }

    /// The delay actually slept before re-attempting: [`delay`](Self::delay),
    /// jittered into `[delay/2, delay]` when jitter is enabled.
    pub fn sleep_for(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let upper = delay.as_millis() as u64;
        let lower = upper / 2;
        Duration::from_millis(rand::thread_rng().gen_range(lower..=upper))
    }

    /// Effective attempt budget (1 when retries are disabled).
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}

/// Run `op` with a fixed per-attempt timeout and the given retry policy.
///
/// The timeout applies to each attempt independently of backoff sleeps; an
/// elapsed timeout surfaces as [`DispatchError::Timeout`], which is itself
/// retryable. The last error is returned once attempts are exhausted.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    timeout: Option<Duration>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let fut = op();

        let res = if let Some(timeout) = timeout {
            match tokio::time::timeout(timeout, fut).await {
                Ok(r) => r,
                Err(_) => Err(DispatchError::Timeout),
            }
        } else {
            fut.await
        };

        match res {
            Ok(val) => return Ok(val),
            Err(e) if e.is_retryable(&policy.statuses) && attempt < max_attempts => {
                let backoff = policy.sleep_for(attempt);
                tracing::warn!(
                    attempt,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "Retrying provider call"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
