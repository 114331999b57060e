//! Time-bounded provider health flags.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default flag TTL in seconds.
pub const DEFAULT_HEALTH_TTL_SECS: u64 = 300;

struct HealthEntry {
    healthy: bool,
    expires_at: Instant,
}

/// Per-provider boolean health flag with TTL expiry.
///
/// Absence of an entry (or an expired one) means healthy: the store fails
/// open, and an unhealthy flag self-heals once its TTL elapses. This is a
/// binary, time-based circuit breaker with no half-open probing state.
pub struct HealthStore {
    entries: Mutex<HashMap<String, HealthEntry>>,
    ttl: Duration,
}

impl Default for HealthStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_HEALTH_TTL_SECS))
    }
}

impl HealthStore {
    /// Create a store whose marks expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Flag `provider` unhealthy for the configured TTL.
    pub fn mark_failure(&self, provider: &str) {
        self.put(provider, false);
    }

    /// Flag `provider` healthy for the configured TTL.
    pub fn mark_healthy(&self, provider: &str) {
        self.put(provider, true);
    }

    /// Whether `provider` is currently considered healthy.
    pub fn is_healthy(&self, provider: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        match entries.get(provider) {
            Some(entry) if entry.expires_at > Instant::now() => entry.healthy,
            _ => true,
        }
    }

    fn put(&self, provider: &str, healthy: bool) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        // Writes double as the pruning opportunity for expired flags.
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            provider.to_string(),
            HealthEntry {
                healthy,
                expires_at: now + self.ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_defaults_to_healthy() {
        let store = HealthStore::default();
        assert!(store.is_healthy("openai"));
    }

    #[test]
    fn failure_mark_flips_flag() {
        let store = HealthStore::default();
        store.mark_failure("openai");
        assert!(!store.is_healthy("openai"));
        assert!(store.is_healthy("claude"));
    }

    #[test]
    fn healthy_mark_overrides_failure() {
        let store = HealthStore::default();
        store.mark_failure("openai");
        store.mark_healthy("openai");
        assert!(store.is_healthy("openai"));
    }

    #[test]
    fn expired_failure_self_heals() {
        let store = HealthStore::new(Duration::from_millis(10));
        store.mark_failure("openai");
        assert!(!store.is_healthy("openai"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.is_healthy("openai"));
    }

    #[test]
    fn writes_prune_expired_entries() {
        let store = HealthStore::new(Duration::from_millis(10));
        store.mark_failure("openai");
        std::thread::sleep(Duration::from_millis(20));
        store.mark_failure("claude");
        let entries = store.entries.lock().unwrap();
        assert!(!entries.contains_key("openai"));
        assert!(entries.contains_key("claude"));
    }
}
