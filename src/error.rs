//! Error types for the dispatch pipeline.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Unified error type covering configuration, capability, transport, policy,
/// and validation failures.
///
/// Variants are intentionally coarse-grained so that callers can match on
/// error *category* (retryable vs permanent, fallback-eligible vs fatal)
/// rather than on provider-specific details.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Invalid or missing configuration (unknown provider, missing prompt
    /// template, unreadable file, etc.). Fatal, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested capability is absent on every candidate provider.
    /// Distinguishable from a transport failure so callers can branch.
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// A transport or HTTP-level failure from a provider call. The only error
    /// kind that participates in cross-provider fallback.
    #[error("Provider [{provider}] call failed: {message}")]
    ProviderCall {
        /// Name of the provider that failed.
        provider: String,
        /// HTTP status, when the failure carried one. `None` means a
        /// transport-level failure (connection reset, DNS, etc.).
        status: Option<u16>,
        /// Human-readable failure detail.
        message: String,
    },

    /// A single provider attempt exceeded the per-attempt timeout.
    #[error("Provider call timed out")]
    Timeout,

    /// A content policy or a before-request guard vetoed the request. Fatal:
    /// the content itself is the problem, so no fallback is attempted.
    #[error("Request blocked by policy: {0}")]
    PolicyViolation(String),

    /// The response payload did not match the caller-supplied schema.
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    /// Queue admission rejected the enqueue for this provider's window.
    #[error("Queue rate limit exceeded for provider [{0}]")]
    RateLimited(String),
}

impl DispatchError {
    /// Returns `true` when a single provider call may be re-attempted:
    /// transport failures without an HTTP status, failures whose status is in
    /// `statuses`, and per-attempt timeouts.
    pub fn is_retryable(&self, statuses: &[u16]) -> bool {
        match self {
            Self::ProviderCall { status: None, .. } => true,
            Self::ProviderCall {
                status: Some(code), ..
            } => statuses.contains(code),
            Self::Timeout => true,
            _ => false,
        }
    }

    /// Returns `true` for error kinds that trigger candidate fallback at the
    /// dispatcher level. Everything else aborts the whole dispatch.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::ProviderCall { .. } | Self::Timeout)
    }
}
