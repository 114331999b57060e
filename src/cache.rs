//! Deterministic response fingerprinting and TTL-bounded memoization.

use crate::api::{CacheConfig, NON_DETERMINISTIC_KEYS, Operation, Options, Response};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    response: Response,
    expires_at: Instant,
}

/// TTL-bounded in-memory cache of provider responses, keyed by a
/// deterministic fingerprint of the call.
///
/// Two requests with identical provider, method, args, and deterministic
/// options always hit the same key; expiry is the only invalidation path.
pub struct ResponseCache {
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Create a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether caching applies to this call: the `cache` option overrides the
    /// global default.
    pub fn enabled(&self, options: &Options) -> bool {
        options.cache().unwrap_or(self.config.enabled)
    }

    /// TTL for this call: the `cache_ttl` option overrides the global default.
    pub fn ttl(&self, options: &Options) -> Duration {
        Duration::from_secs(options.cache_ttl().unwrap_or(self.config.ttl_secs))
    }

    /// Deterministic fingerprint: prefix + hex SHA-256 over the canonical
    /// JSON of `{provider, method, args, normalized_options}`.
    ///
    /// Normalized options exclude every key that does not affect the semantic
    /// result (`async`, `cache`, `cache_ttl`, `provider`, `fallback`,
    /// `routing`, `response_schema`, `dto`, `trace_id`).
    pub fn key(
        &self,
        provider: &str,
        method: Operation,
        args: &[Value],
        options: &Options,
    ) -> String {
        let payload = json!({
            "provider": provider,
            "method": method.as_str(),
            "args": args,
            "options": normalize_options(options),
        });

        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        format!("{}{:x}", self.config.prefix, hasher.finalize())
    }

    /// Fetch an unexpired entry. Expired entries are dropped on read.
    pub fn get(&self, key: &str) -> Option<Response> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a response verbatim under `key` for `ttl`.
    pub fn put(&self, key: String, response: Response, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            CacheEntry {
                response,
                expires_at: now + ttl,
            },
        );
    }
}

/// Drop the keys that select providers, toggle features, or carry identifiers
/// rather than affecting the semantic result.
fn normalize_options(options: &Options) -> Options {
    let mut normalized = options.clone();
    for key in NON_DETERMINISTIC_KEYS {
        normalized.0.remove(*key);
    }
    normalized
}
