//! Content policies applied to outbound request arguments.

use crate::api::{Operation, Options};
use crate::error::{DispatchError, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// A content-inspection/transform rule applied before any provider sees the
/// request.
///
/// Policies must be side-effect free, must not reorder argument positions,
/// and may reject the request outright with
/// [`DispatchError::PolicyViolation`].
pub trait Policy: Send + Sync {
    /// Inspect and optionally rewrite the request arguments.
    fn apply(
        &self,
        method: Operation,
        args: Vec<Value>,
        options: Options,
    ) -> Result<(Vec<Value>, Options)>;
}

/// Sequential chain of [`Policy`] transforms.
#[derive(Default)]
pub struct PolicyEngine {
    policies: Vec<Box<dyn Policy>>,
}

impl PolicyEngine {
    /// Create an engine over an ordered policy list.
    pub fn new(policies: Vec<Box<dyn Policy>>) -> Self {
        Self { policies }
    }

    /// Builder-style append.
    pub fn with_policy(mut self, policy: impl Policy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    /// Run every policy in order, threading the rewritten args/options
    /// forward. The first rejection aborts the chain.
    pub fn sanitize(
        &self,
        method: Operation,
        mut args: Vec<Value>,
        mut options: Options,
    ) -> Result<(Vec<Value>, Options)> {
        for policy in &self.policies {
            (args, options) = policy.apply(method, args, options)?;
        }
        Ok((args, options))
    }
}

/// Rejects requests whose serialized arguments contain a denylisted term
/// (case-insensitive substring match).
pub struct DenylistPolicy {
    terms: Vec<String>,
}

impl DenylistPolicy {
    /// Create a policy over the given terms. Empty terms are ignored.
    pub fn new(terms: Vec<String>) -> Self {
        Self {
            terms: terms.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }
}

impl Policy for DenylistPolicy {
    fn apply(
        &self,
        _method: Operation,
        args: Vec<Value>,
        options: Options,
    ) -> Result<(Vec<Value>, Options)> {
        if self.terms.is_empty() {
            return Ok((args, options));
        }

        let flat = serde_json::to_string(&args)
            .map_err(|e| DispatchError::Config(format!("Unserializable arguments: {}", e)))?
            .to_lowercase();

        for term in &self.terms {
            if flat.contains(&term.to_lowercase()) {
                return Err(DispatchError::PolicyViolation(
                    "Request blocked by denylist policy".to_string(),
                ));
            }
        }

        Ok((args, options))
    }
}

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").unwrap());
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s().-]{7,}\d").unwrap());

/// Replaces email-like and phone-like substrings in string leaves of the
/// arguments with fixed placeholder tokens.
#[derive(Default)]
pub struct RedactPiiPolicy;

impl RedactPiiPolicy {
    fn redact(value: &str) -> String {
        let value = EMAIL_RE.replace_all(value, "[redacted-email]");
        PHONE_RE.replace_all(&value, "[redacted-phone]").into_owned()
    }

    fn walk(value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(Self::redact(&s)),
            Value::Array(items) => Value::Array(items.into_iter().map(Self::walk).collect()),
            Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Self::walk(v))).collect())
            }
            other => other,
        }
    }
}

impl Policy for RedactPiiPolicy {
    fn apply(
        &self,
        _method: Operation,
        args: Vec<Value>,
        options: Options,
    ) -> Result<(Vec<Value>, Options)> {
        let args = args.into_iter().map(Self::walk).collect();
        Ok((args, options))
    }
}
