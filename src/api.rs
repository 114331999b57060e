//! Public API types: operations, request options, responses, and the
//! dispatcher configuration tree.

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// The closed set of operations the dispatcher can route.
///
/// Capability-gated operations (vision, audio, streaming) are only served by
/// providers that expose the matching optional interface; everything else is
/// assumed universally supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Generate text from a single prompt.
    Text,
    /// Chat completion over role-based messages.
    Chat,
    /// Stream text chunks from a prompt.
    StreamText,
    /// Stream chat chunks from role-based messages.
    StreamChat,
    /// Generate images from a prompt.
    Image,
    /// Summarize a long text input.
    Summarize,
    /// Run a vision prompt against one or more images.
    Vision,
    /// Summarize the contents of a local file.
    SummarizeFile,
    /// Generate embeddings for one or more texts.
    Embeddings,
    /// Transcribe an audio file.
    Transcribe,
    /// Generate speech audio for a text.
    Speak,
    /// Generate embeddings for the contents of a local file.
    EmbeddingsFile,
    /// Rank candidate items by embedding similarity to a query.
    Recommend,
}

/// An optional provider capability required by some operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Image understanding (the `vision` operation).
    Vision,
    /// Audio transcription and speech synthesis.
    Audio,
    /// Incremental chunked text responses.
    Streaming,
}

impl Operation {
    /// Stable snake_case name used in cache keys, events, and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Chat => "chat",
            Self::StreamText => "stream_text",
            Self::StreamChat => "stream_chat",
            Self::Image => "image",
            Self::Summarize => "summarize",
            Self::Vision => "vision",
            Self::SummarizeFile => "summarize_file",
            Self::Embeddings => "embeddings",
            Self::Transcribe => "transcribe",
            Self::Speak => "speak",
            Self::EmbeddingsFile => "embeddings_file",
            Self::Recommend => "recommend",
        }
    }

    /// The optional capability a provider must expose to serve this
    /// operation, if any.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Self::Vision => Some(Capability::Vision),
            Self::Transcribe | Self::Speak => Some(Capability::Audio),
            Self::StreamText | Self::StreamChat => Some(Capability::Streaming),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Option keys that do not affect the semantic result of a provider call and
/// are therefore excluded from cache fingerprints.
pub const NON_DETERMINISTIC_KEYS: &[&str] = &[
    "async",
    "cache",
    "cache_ttl",
    "provider",
    "fallback",
    "routing",
    "response_schema",
    "dto",
    "trace_id",
];

/// Explicit provider selection carried in the `provider` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOverride {
    /// A single provider name.
    Single(String),
    /// An ordered candidate list; respected verbatim by the router.
    List(Vec<String>),
}

/// Named parameters for a dispatch call.
///
/// A thin wrapper over a JSON object map. The dispatcher recognizes the keys
/// `provider`, `cache`, `cache_ttl`, `fallback`, `routing`, `response_schema`,
/// `dto`, `trace_id`, and `async`; every other key passes through to the
/// provider untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(pub Map<String, Value>);

impl Options {
    /// An empty option map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Look up a raw option value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert a raw option value.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    fn bool_opt(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// The explicit provider override, when present. Empty strings and empty
    /// lists are treated as absent.
    pub fn provider_override(&self) -> Option<ProviderOverride> {
        match self.0.get("provider") {
            Some(Value::String(name)) if !name.is_empty() => {
                Some(ProviderOverride::Single(name.clone()))
            }
            Some(Value::Array(items)) => {
                let names: Vec<String> = items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    None
                } else {
                    Some(ProviderOverride::List(names))
                }
            }
            _ => None,
        }
    }

    /// Per-call cache enable/disable override.
    pub fn cache(&self) -> Option<bool> {
        self.bool_opt("cache")
    }

    /// Per-call cache TTL override, in seconds.
    pub fn cache_ttl(&self) -> Option<u64> {
        self.0.get("cache_ttl").and_then(Value::as_u64)
    }

    /// Per-call fallback enable/disable override.
    pub fn fallback(&self) -> Option<bool> {
        self.bool_opt("fallback")
    }

    /// Per-call routing strategy override.
    pub fn routing(&self) -> Option<RouteStrategy> {
        match self.0.get("routing").and_then(Value::as_str) {
            Some("latency") => Some(RouteStrategy::Latency),
            Some("cost") => Some(RouteStrategy::Cost),
            _ => None,
        }
    }

    /// Caller-supplied JSON Schema for the response payload.
    pub fn response_schema(&self) -> Option<&Value> {
        self.0.get("response_schema")
    }

    /// Per-call typed-response projection override.
    pub fn dto(&self) -> Option<bool> {
        self.bool_opt("dto")
    }

    /// The trace identifier, once assigned by middleware or the caller.
    pub fn trace_id(&self) -> Option<&str> {
        self.0.get("trace_id").and_then(Value::as_str)
    }

    /// Whether the call should be enqueued instead of dispatched inline.
    pub fn is_async(&self) -> bool {
        self.bool_opt("async").unwrap_or(false)
    }
}

/// A provider response in its generic, provider-agnostic shape.
///
/// Exactly which payload fields are populated depends on the operation; `raw`
/// always carries the opaque provider payload and `usage` any token/cost
/// metadata the provider reported. Cached verbatim; mutated only by
/// after-middleware and the typed projection step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Generated text content (text/chat/summarize/vision).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Generated images (image).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Value>>,
    /// Embedding vectors or `{embedding: [...]}` envelopes (embeddings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Value>>,
    /// Transcribed text (transcribe).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Encoded audio (speak).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// Audio container format (speak).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Tool invocations requested by the model (chat).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
    /// Opaque provider payload, passed through untouched.
    #[serde(default)]
    pub raw: Value,
    /// Token/cost metadata reported by the provider.
    #[serde(default)]
    pub usage: Map<String, Value>,
}

impl Response {
    /// Convenience constructor for text-bearing responses.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

/// Handle returned when a call is enqueued instead of dispatched inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Transport-assigned job identifier.
    pub id: String,
    /// The queued operation.
    pub action: Operation,
    /// Provider hint forwarded to the worker, if any.
    pub provider: Option<String>,
}

/// Terminal outcome of a dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A completed provider response.
    Response(Response),
    /// A completed response projected into its typed shape (`dto` option).
    Typed(crate::dto::TypedResponse),
    /// The call was enqueued; the provider has not been invoked yet.
    Queued(JobHandle),
}

impl DispatchOutcome {
    /// Unwrap a completed response, erroring on queued outcomes.
    pub fn into_response(self) -> Result<Response> {
        match self {
            Self::Response(response) => Ok(response),
            Self::Typed(typed) => Ok(typed.into_response()),
            Self::Queued(job) => Err(DispatchError::Config(format!(
                "Call was queued as job [{}]; no inline response available",
                job.id
            ))),
        }
    }

    /// Unwrap a queued job handle, if this outcome is one.
    pub fn into_job(self) -> Option<JobHandle> {
        match self {
            Self::Queued(job) => Some(job),
            _ => None,
        }
    }
}

/// Routing strategy for ordering provider candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    /// Cheapest first. This is the default.
    #[default]
    Cost,
    /// Lowest expected latency first.
    Latency,
}

/// Per-provider weights consulted by the router. Missing weights sort last.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RouteWeights {
    /// Relative cost score (lower is cheaper).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Relative latency score (lower is faster).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
}

/// Cache layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Global default; the `cache` option overrides it per call.
    pub enabled: bool,
    /// Default TTL in seconds; the `cache_ttl` option overrides it per call.
    pub ttl_secs: u64,
    /// Prefix prepended to every cache fingerprint.
    pub prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 300,
            prefix: "polyrelay:".to_string(),
        }
    }
}

/// Static fallback configuration used when routing is disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Whether fallback candidates are appended after the primary provider.
    pub enabled: bool,
    /// Ordered fallback provider names.
    pub providers: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            providers: Vec::new(),
        }
    }
}

/// Health-aware routing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RoutingConfig {
    /// Whether the router (rather than the static fallback list) resolves
    /// candidates.
    pub enabled: bool,
    /// Default ranking strategy; the `routing` option overrides it per call.
    pub strategy: RouteStrategy,
    /// Cost/latency weight table. An empty table disables ranking.
    pub providers: HashMap<String, RouteWeights>,
}

/// Queue transport and admission-control configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QueueConfig {
    /// Whether queued (async) dispatch is available.
    pub enabled: bool,
    /// Optional named connection forwarded to the transport.
    pub connection: Option<String>,
    /// Optional named queue forwarded to the transport.
    pub queue: Option<String>,
    /// Whether per-provider admission budgets are enforced.
    pub rate_limits_enabled: bool,
    /// Per-provider `per_minute` budgets; 0 or absent means unlimited.
    pub per_minute: HashMap<String, u32>,
}

/// Usage-event configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Whether `UsageReported` events are emitted.
    pub events: bool,
    /// Include the (possibly redacted) options in usage events.
    pub include_options: bool,
    /// Include the full response in usage events.
    pub include_response: bool,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            events: true,
            include_options: false,
            include_response: false,
        }
    }
}

/// Top-level dispatcher configuration.
///
/// Every section has serde defaults, so a partial JSON document (or
/// `DispatcherConfig::default()`) yields a working configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Provider used when no override or routing applies.
    pub default_provider: String,
    /// Fixed per-attempt timeout for outbound provider calls, in seconds.
    pub timeout_secs: u64,
    /// Retry/backoff policy applied per outbound provider call.
    pub retry: crate::retry::RetryPolicy,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// Static fallback settings.
    pub fallback: FallbackConfig,
    /// Health-aware routing settings.
    pub routing: RoutingConfig,
    /// Queue transport and admission settings.
    pub queue: QueueConfig,
    /// Usage-event settings.
    pub usage: UsageConfig,
    /// Provider health flag TTL, in seconds.
    pub health_ttl_secs: u64,
    /// Whether usage is written to the structured log.
    pub logging_enabled: bool,
    /// Whether before/after request hooks fire.
    pub hooks_enabled: bool,
    /// Whether timing events and metrics are emitted.
    pub observability_enabled: bool,
    /// Global default for typed-response projection; the `dto` option
    /// overrides it per call.
    pub dto_enabled: bool,
    /// Named prompt templates rendered with `{key}` substitution.
    pub prompts: HashMap<String, String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_provider: "openai".to_string(),
            timeout_secs: 60,
            retry: crate::retry::RetryPolicy::default(),
            cache: CacheConfig::default(),
            fallback: FallbackConfig::default(),
            routing: RoutingConfig::default(),
            queue: QueueConfig::default(),
            usage: UsageConfig::default(),
            health_ttl_secs: 300,
            logging_enabled: true,
            hooks_enabled: true,
            observability_enabled: true,
            dto_enabled: false,
            prompts: HashMap::new(),
        }
    }
}

/// Parse a [`DispatcherConfig`] from a JSON string.
pub fn config_from_str(s: &str) -> Result<DispatcherConfig> {
    serde_json::from_str(s)
        .map_err(|e| DispatchError::Config(format!("Invalid dispatcher config JSON: {}", e)))
}

/// Read and parse a [`DispatcherConfig`] from a JSON file.
pub fn config_from_file(path: impl AsRef<Path>) -> Result<DispatcherConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        DispatchError::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    config_from_str(&contents)
}
