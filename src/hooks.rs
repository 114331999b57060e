//! Observer events and before-request guards.

use crate::api::{Operation, Options, Response};
use crate::store::{RecordStore, UsageRecord};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Events produced by the dispatcher for observers.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// Fired immediately before a provider invocation.
    BeforeRequest {
        /// Candidate provider about to be invoked.
        provider: String,
        /// Operation being dispatched.
        method: Operation,
        /// Positional arguments after middleware rewrites.
        args: Vec<Value>,
        /// Options after middleware rewrites.
        options: Options,
    },
    /// Fired after a successful provider invocation.
    AfterRequest {
        /// Provider that served the request.
        provider: String,
        /// Operation that was dispatched.
        method: Operation,
        /// Positional arguments as sent to the provider.
        args: Vec<Value>,
        /// Options as sent to the provider.
        options: Options,
        /// The provider's response.
        response: Response,
    },
    /// Fired whenever a response reported usage and usage events are enabled.
    UsageReported {
        /// Provider that served the request.
        provider: String,
        /// Operation that was dispatched.
        method: Operation,
        /// Usage metadata from the response.
        usage: Map<String, Value>,
        /// Options, included only when configured; empty otherwise.
        options: Options,
        /// Response, included only when configured; `None` otherwise.
        response: Option<Response>,
    },
    /// Fired once per successful dispatch with the end-to-end duration.
    RequestTimed {
        /// Provider that served the request.
        provider: String,
        /// Operation that was dispatched.
        method: Operation,
        /// Wall-clock duration in milliseconds.
        duration_ms: f64,
        /// Trace identifier from the attempt context, if assigned.
        trace_id: Option<String>,
    },
}

/// A synchronous observer of [`DispatchEvent`]s.
pub trait EventSink: Send + Sync {
    /// Handle one event. Sinks must not block for long; they run inline on
    /// the dispatch path.
    fn handle(&self, event: &DispatchEvent);
}

/// Verdict returned by a [`RequestGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Let the request proceed.
    Allow,
    /// Abort the whole dispatch with a policy violation.
    Deny(String),
}

/// A synchronous pre-dispatch gate. Guards run in order before every
/// provider invocation; the first deny aborts the call.
pub trait RequestGuard: Send + Sync {
    /// Inspect the outbound request.
    fn inspect(
        &self,
        provider: &str,
        method: Operation,
        args: &[Value],
        options: &Options,
    ) -> Verdict;
}

/// Event sink that appends `UsageReported` events to a record store.
pub struct StoreUsageListener {
    store: Arc<dyn RecordStore>,
}

impl StoreUsageListener {
    /// Write usage events into `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

impl EventSink for StoreUsageListener {
    fn handle(&self, event: &DispatchEvent) {
        let DispatchEvent::UsageReported {
            provider,
            method,
            usage,
            options,
            ..
        } = event
        else {
            return;
        };

        let mut meta = Map::new();
        meta.insert("options".to_string(), Value::Object(options.0.clone()));

        self.store.append_usage(UsageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            provider: provider.clone(),
            method: method.as_str().to_string(),
            usage: usage.clone(),
            meta,
            recorded_at: chrono::Utc::now(),
        });
    }
}
