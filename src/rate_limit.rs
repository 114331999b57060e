//! Fixed-window admission control for queued dispatches.

use crate::api::QueueConfig;
use crate::error::{DispatchError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    count: u32,
    expires_at: Instant,
}

/// Per-provider, per-calendar-minute admission counter for queued requests.
///
/// The first increment of a window sets its 60-second expiry; an increment
/// that pushes the count over the budget rejects the enqueue without rolling
/// the increment back, so the window simply saturates until it expires.
/// A budget of 0 or an absent entry means unlimited.
pub struct QueueRateLimiter {
    config: QueueConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl QueueRateLimiter {
    /// Create a limiter over the configured per-minute budgets.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject an enqueue for `provider` in the current minute.
    pub fn admit(&self, provider: &str) -> Result<()> {
        self.admit_at(provider, Utc::now())
    }

    /// Admission check against an explicit clock; `admit` feeds in `Utc::now`.
    pub fn admit_at(&self, provider: &str, when: DateTime<Utc>) -> Result<()> {
        if !self.config.rate_limits_enabled {
            return Ok(());
        }

        let budget = self.config.per_minute.get(provider).copied().unwrap_or(0);
        if budget == 0 {
            return Ok(());
        }

        let key = format!("{}:{}", provider, when.format("%Y%m%d%H%M"));
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        windows.retain(|_, window| window.expires_at > now);

        let window = windows.entry(key).or_insert_with(|| Window {
            count: 0,
            expires_at: now + Duration::from_secs(60),
        });
        window.count += 1;

        if window.count > budget {
            return Err(DispatchError::RateLimited(provider.to_string()));
        }

        Ok(())
    }
}
