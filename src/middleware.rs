//! Request/response middleware applied around every dispatch attempt.

use crate::api::{Operation, Options, Response};
use crate::error::Result;
use crate::policy::PolicyEngine;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// Mutable per-attempt state threaded through the middleware chain.
///
/// Created fresh for each candidate attempt and discarded once the call
/// completes; never persisted.
#[derive(Debug, Clone)]
pub struct Context {
    /// Monotonic timestamp taken when the attempt began.
    pub started_at: Instant,
    /// Trace identifier, once assigned by the caller or middleware.
    pub trace_id: Option<String>,
    /// Free-form values middleware may stash for its `after` half.
    pub extra: Map<String, Value>,
}

impl Context {
    /// Fresh context for one attempt, seeding any caller-supplied trace id.
    pub fn new(options: &Options) -> Self {
        Self {
            started_at: Instant::now(),
            trace_id: options.trace_id().map(str::to_string),
            extra: Map::new(),
        }
    }

    /// Milliseconds elapsed since the attempt began.
    pub fn elapsed_ms(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64() * 1000.0
    }
}

/// A before/after transform pair applied around every dispatch attempt.
///
/// The dispatcher applies the full ordered `before` list once per attempted
/// provider, threading the same context forward, then the full ordered
/// `after` list once per successful response.
pub trait Middleware: Send + Sync {
    /// Rewrite args/options/context before the provider call.
    fn before(
        &self,
        provider: &str,
        method: Operation,
        args: Vec<Value>,
        options: Options,
        context: Context,
    ) -> Result<(Vec<Value>, Options, Context)>;

    /// Rewrite the response/context after a successful provider call.
    fn after(
        &self,
        provider: &str,
        method: Operation,
        response: Response,
        context: Context,
    ) -> Result<(Response, Context)>;
}

/// Assigns a fresh trace identifier into both options and context when absent.
///
/// Idempotent: an id already present in options or context is reused.
#[derive(Default)]
pub struct TraceIdMiddleware;

impl Middleware for TraceIdMiddleware {
    fn before(
        &self,
        _provider: &str,
        _method: Operation,
        args: Vec<Value>,
        mut options: Options,
        mut context: Context,
    ) -> Result<(Vec<Value>, Options, Context)> {
        let trace_id = options
            .trace_id()
            .map(str::to_string)
            .or_else(|| context.trace_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        options.insert("trace_id", trace_id.clone());
        context.trace_id = Some(trace_id);

        Ok((args, options, context))
    }

    fn after(
        &self,
        _provider: &str,
        _method: Operation,
        response: Response,
        context: Context,
    ) -> Result<(Response, Context)> {
        Ok((response, context))
    }
}

/// Delegates `before` to the policy engine's sanitize chain; passthrough
/// `after`.
pub struct RedactMiddleware {
    engine: Arc<PolicyEngine>,
}

impl RedactMiddleware {
    /// Wrap the given policy engine.
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }
}

impl Middleware for RedactMiddleware {
    fn before(
        &self,
        _provider: &str,
        method: Operation,
        args: Vec<Value>,
        options: Options,
        context: Context,
    ) -> Result<(Vec<Value>, Options, Context)> {
        let (args, options) = self.engine.sanitize(method, args, options)?;
        Ok((args, options, context))
    }

    fn after(
        &self,
        _provider: &str,
        _method: Operation,
        response: Response,
        context: Context,
    ) -> Result<(Response, Context)> {
        Ok((response, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RedactPiiPolicy;
    use serde_json::json;

    #[test]
    fn trace_id_assigned_when_absent() {
        let middleware = TraceIdMiddleware;
        let context = Context::new(&Options::new());
        let (_, options, context) = middleware
            .before(
                "openai",
                Operation::Text,
                vec![json!("hi")],
                Options::new(),
                context,
            )
            .unwrap();
        let assigned = options.trace_id().unwrap().to_string();
        assert!(!assigned.is_empty());
        assert_eq!(context.trace_id.as_deref(), Some(assigned.as_str()));
    }

    #[test]
    fn trace_id_is_idempotent() {
        let middleware = TraceIdMiddleware;
        let options = Options::new().with("trace_id", "fixed-id");
        let context = Context::new(&options);
        let (_, options, context) = middleware
            .before("openai", Operation::Text, vec![], options, context)
            .unwrap();
        assert_eq!(options.trace_id(), Some("fixed-id"));
        assert_eq!(context.trace_id.as_deref(), Some("fixed-id"));
    }

    #[test]
    fn redact_middleware_applies_policies_before_only() {
        let engine = Arc::new(crate::policy::PolicyEngine::default().with_policy(RedactPiiPolicy));
        let middleware = RedactMiddleware::new(engine);
        let context = Context::new(&Options::new());
        let (args, _, context) = middleware
            .before(
                "openai",
                Operation::Text,
                vec![json!("reach me at a@b.io")],
                Options::new(),
                context,
            )
            .unwrap();
        assert_eq!(args[0], json!("reach me at [redacted-email]"));

        let response = Response::from_content("untouched");
        let (response, _) = middleware
            .after("openai", Operation::Text, response, context)
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("untouched"));
    }
}
