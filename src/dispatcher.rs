//! The dispatch orchestrator: candidate resolution, the middleware/cache/
//! guard pipeline, retries, fallback, and the queued path.

use crate::api::{
    DispatchOutcome, DispatcherConfig, JobHandle, Operation, Options, ProviderOverride, Response,
};
use crate::cache::ResponseCache;
use crate::dto::TypedResponse;
use crate::error::{DispatchError, Result};
use crate::health::HealthStore;
use crate::hooks::{DispatchEvent, EventSink, RequestGuard, Verdict};
use crate::middleware::{Context, Middleware, RedactMiddleware, TraceIdMiddleware};
use crate::policy::{PolicyEngine, RedactPiiPolicy};
use crate::rate_limit::QueueRateLimiter;
use crate::registry::ProviderRegistry;
use crate::retry::with_retry;
use crate::routing::ProviderRouter;
use crate::similarity::{
    Recommendation, RecommendResponse, normalize_embeddings, rank_by_similarity,
};
use crate::store::{RecordStore, render_template};
use crate::traits::{Provider, QueueRouting, QueueTransport, TextStream};
use futures::StreamExt;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Synchronous observer invoked with each stream chunk before it is yielded.
pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// The dispatch façade.
///
/// One instance owns the provider registry, health store, router, cache,
/// and queue admission state; construction goes through [`Dispatcher::builder`].
pub struct Dispatcher {
    config: DispatcherConfig,
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthStore>,
    router: ProviderRouter,
    cache: ResponseCache,
    rate_limiter: QueueRateLimiter,
    middleware: Vec<Arc<dyn Middleware>>,
    guards: Vec<Arc<dyn RequestGuard>>,
    sinks: Vec<Arc<dyn EventSink>>,
    queue: Option<Arc<dyn QueueTransport>>,
}

/// Staged construction of a [`Dispatcher`].
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    registry: Arc<ProviderRegistry>,
    middleware: Vec<Arc<dyn Middleware>>,
    guards: Vec<Arc<dyn RequestGuard>>,
    sinks: Vec<Arc<dyn EventSink>>,
    queue: Option<Arc<dyn QueueTransport>>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            config: DispatcherConfig::default(),
            registry: Arc::new(ProviderRegistry::new()),
            middleware: Vec::new(),
            guards: Vec::new(),
            sinks: Vec::new(),
            queue: None,
        }
    }

    /// Replace the default configuration.
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a provider instance.
    pub fn provider(self, provider: Arc<dyn Provider>) -> Self {
        self.registry.register(provider);
        self
    }

    /// Register a lazily-constructed provider.
    pub fn lazy_provider(
        self,
        name: &str,
        factory: impl Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
    ) -> Self {
        self.registry.register_lazy(name, factory);
        self
    }

    /// Append a middleware to the chain. When none are added the built
    /// dispatcher installs [`TraceIdMiddleware`] and a [`RedactMiddleware`]
    /// running [`RedactPiiPolicy`].
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Append a request guard.
    pub fn guard(mut self, guard: impl RequestGuard + 'static) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    /// Append an event sink.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Install the queue transport used by queued (async) dispatch.
    pub fn queue_transport(mut self, transport: Arc<dyn QueueTransport>) -> Self {
        self.queue = Some(transport);
        self
    }

    /// Install a record store and wire usage events into it.
    pub fn record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.sinks
            .push(Arc::new(crate::hooks::StoreUsageListener::new(store)));
        self
    }

    /// Finish construction.
    pub fn build(self) -> Dispatcher {
        let health = Arc::new(HealthStore::new(Duration::from_secs(
            self.config.health_ttl_secs,
        )));
        let router = ProviderRouter::new(
            self.config.routing.clone(),
            self.config.default_provider.clone(),
            health.clone(),
        );
        let cache = ResponseCache::new(self.config.cache.clone());
        let rate_limiter = QueueRateLimiter::new(self.config.queue.clone());

        let middleware = if self.middleware.is_empty() {
            let engine = Arc::new(PolicyEngine::default().with_policy(RedactPiiPolicy));
            vec![
                Arc::new(TraceIdMiddleware) as Arc<dyn Middleware>,
                Arc::new(RedactMiddleware::new(engine)),
            ]
        } else {
            self.middleware
        };

        Dispatcher {
            config: self.config,
            registry: self.registry,
            health,
            router,
            cache,
            rate_limiter,
            middleware,
            guards: self.guards,
            sinks: self.sinks,
            queue: self.queue,
        }
    }
}

impl Dispatcher {
    /// Start building a dispatcher.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Register a provider after construction.
    pub fn register_provider(&self, provider: Arc<dyn Provider>) {
        self.registry.register(provider);
    }

    /// The health store, for inspection and manual overrides.
    pub fn health(&self) -> &Arc<HealthStore> {
        &self.health
    }

    // Operation surface.

    /// Generate text from a prompt.
    pub async fn text(&self, prompt: &str, options: Options) -> Result<DispatchOutcome> {
        self.dispatch(Operation::Text, vec![json!(prompt)], options)
            .await
    }

    /// Run a chat completion over role-based messages.
    pub async fn chat(&self, messages: Vec<Value>, options: Options) -> Result<DispatchOutcome> {
        self.dispatch(Operation::Chat, vec![Value::Array(messages)], options)
            .await
    }

    /// Generate images from a prompt.
    pub async fn image(&self, prompt: &str, options: Options) -> Result<DispatchOutcome> {
        self.dispatch(Operation::Image, vec![json!(prompt)], options)
            .await
    }

    /// Summarize a long text input.
    pub async fn summarize(&self, text: &str, options: Options) -> Result<DispatchOutcome> {
        self.dispatch(Operation::Summarize, vec![json!(text)], options)
            .await
    }

    /// Run a vision prompt against one or more images.
    pub async fn vision(
        &self,
        prompt: &str,
        images: Value,
        options: Options,
    ) -> Result<DispatchOutcome> {
        self.dispatch(Operation::Vision, vec![json!(prompt), images], options)
            .await
    }

    /// Generate embeddings for a text or an array of texts.
    pub async fn embeddings(&self, input: Value, options: Options) -> Result<DispatchOutcome> {
        self.dispatch(Operation::Embeddings, vec![input], options)
            .await
    }

    /// Transcribe an audio file from a local path.
    pub async fn transcribe(&self, path: &str, options: Options) -> Result<DispatchOutcome> {
        self.dispatch(Operation::Transcribe, vec![json!(path)], options)
            .await
    }

    /// Generate speech audio for the given text.
    pub async fn speak(&self, text: &str, options: Options) -> Result<DispatchOutcome> {
        self.dispatch(Operation::Speak, vec![json!(text)], options)
            .await
    }

    /// Summarize the contents of a local file. HTML files are stripped of
    /// tags; PDFs are rejected as unsupported.
    pub async fn summarize_file(&self, path: &str, options: Options) -> Result<DispatchOutcome> {
        let text = read_file_input(path)?;
        self.dispatch(Operation::Summarize, vec![json!(text)], options)
            .await
    }

    /// Generate embeddings for the contents of a local file.
    pub async fn embeddings_file(&self, path: &str, options: Options) -> Result<DispatchOutcome> {
        let text = read_file_input(path)?;
        self.dispatch(Operation::Embeddings, vec![json!(text)], options)
            .await
    }

    /// Rank `candidates` by embedding similarity to `query`, best first.
    ///
    /// Empty candidates short-circuit to an empty result without a provider
    /// call. One embeddings request covers the query and all candidates;
    /// candidates whose vectors come back empty are skipped, a missing query
    /// vector is an error. The returned [`RecommendResponse`] keeps the
    /// embeddings call's usage metadata and raw payload alongside the ranked
    /// list.
    pub async fn recommend(
        &self,
        query: &str,
        candidates: Vec<String>,
        options: Options,
    ) -> Result<RecommendResponse> {
        if candidates.is_empty() {
            return Ok(RecommendResponse::default());
        }

        let mut inputs = Vec::with_capacity(candidates.len() + 1);
        inputs.push(json!(query));
        inputs.extend(candidates.iter().map(|c| json!(c)));

        let response = self
            .dispatch(Operation::Embeddings, vec![Value::Array(inputs)], options)
            .await?
            .into_response()?;

        let vectors = normalize_embeddings(response.embeddings.as_deref().unwrap_or_default());
        let Some((query_vec, candidate_vecs)) = vectors.split_first() else {
            return Err(DispatchError::Config(
                "Embeddings response carried no vectors".to_string(),
            ));
        };
        if query_vec.is_empty() {
            return Err(DispatchError::Config(
                "Embeddings response is missing the query vector".to_string(),
            ));
        }

        let (items, scorable): (Vec<&String>, Vec<Vec<f64>>) = candidates
            .iter()
            .zip(candidate_vecs.iter())
            .filter(|(_, vector)| !vector.is_empty())
            .map(|(item, vector)| (item, vector.clone()))
            .unzip();
        let recommendations = rank_by_similarity(query_vec, &scorable)
            .into_iter()
            .map(|(index, score)| Recommendation {
                item: items[index].clone(),
                score,
            })
            .collect();

        Ok(RecommendResponse {
            recommendations,
            usage: response.usage,
            raw: response.raw,
        })
    }

    /// Render the named config prompt template with `{key}` substitution.
    pub fn prompt(&self, name: &str, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.config.prompts.get(name).ok_or_else(|| {
            DispatchError::Config(format!("Unknown prompt template [{}]", name))
        })?;
        Ok(render_template(template, vars))
    }

    // Streaming surface.

    /// Stream text chunks from a prompt.
    pub async fn stream_text(&self, prompt: &str, options: Options) -> Result<TextStream> {
        self.dispatch_stream(Operation::StreamText, vec![json!(prompt)], options, None)
            .await
    }

    /// Stream text chunks, invoking `on_chunk` before yielding each one.
    pub async fn stream_text_with(
        &self,
        prompt: &str,
        options: Options,
        on_chunk: ChunkCallback,
    ) -> Result<TextStream> {
        self.dispatch_stream(
            Operation::StreamText,
            vec![json!(prompt)],
            options,
            Some(on_chunk),
        )
        .await
    }

    /// Stream chat chunks from role-based messages.
    pub async fn stream_chat(&self, messages: Vec<Value>, options: Options) -> Result<TextStream> {
        self.dispatch_stream(
            Operation::StreamChat,
            vec![Value::Array(messages)],
            options,
            None,
        )
        .await
    }

    /// Stream chat chunks, invoking `on_chunk` before yielding each one.
    pub async fn stream_chat_with(
        &self,
        messages: Vec<Value>,
        options: Options,
        on_chunk: ChunkCallback,
    ) -> Result<TextStream> {
        self.dispatch_stream(
            Operation::StreamChat,
            vec![Value::Array(messages)],
            options,
            Some(on_chunk),
        )
        .await
    }

    // Queued surface.

    /// Enqueue a text generation.
    pub async fn queue_text(&self, prompt: &str, options: Options) -> Result<JobHandle> {
        self.enqueue(Operation::Text, vec![json!(prompt)], &options)
            .await
    }

    /// Enqueue a chat completion.
    pub async fn queue_chat(&self, messages: Vec<Value>, options: Options) -> Result<JobHandle> {
        self.enqueue(Operation::Chat, vec![Value::Array(messages)], &options)
            .await
    }

    /// Enqueue an image generation.
    pub async fn queue_image(&self, prompt: &str, options: Options) -> Result<JobHandle> {
        self.enqueue(Operation::Image, vec![json!(prompt)], &options)
            .await
    }

    /// Enqueue a summarization.
    pub async fn queue_summarize(&self, text: &str, options: Options) -> Result<JobHandle> {
        self.enqueue(Operation::Summarize, vec![json!(text)], &options)
            .await
    }

    /// Enqueue a vision request.
    pub async fn queue_vision(
        &self,
        prompt: &str,
        images: Value,
        options: Options,
    ) -> Result<JobHandle> {
        self.enqueue(Operation::Vision, vec![json!(prompt), images], &options)
            .await
    }

    /// Enqueue an embeddings request.
    pub async fn queue_embeddings(&self, input: Value, options: Options) -> Result<JobHandle> {
        self.enqueue(Operation::Embeddings, vec![input], &options)
            .await
    }

    /// Enqueue a transcription.
    pub async fn queue_transcribe(&self, path: &str, options: Options) -> Result<JobHandle> {
        self.enqueue(Operation::Transcribe, vec![json!(path)], &options)
            .await
    }

    /// Enqueue a speech synthesis.
    pub async fn queue_speak(&self, text: &str, options: Options) -> Result<JobHandle> {
        self.enqueue(Operation::Speak, vec![json!(text)], &options)
            .await
    }

    // Core pipeline.

    /// Dispatch one operation through the full pipeline.
    ///
    /// Candidates are tried in resolution order. Per candidate: capability
    /// probe, before-middleware, cache lookup, guards, provider invocation
    /// under retry with a per-attempt timeout. Transport failures and timeouts
    /// mark the candidate unhealthy and fall through to the next one; every
    /// other error aborts the dispatch. The last fallback-eligible error
    /// surfaces once candidates are exhausted.
    pub async fn dispatch(
        &self,
        op: Operation,
        args: Vec<Value>,
        options: Options,
    ) -> Result<DispatchOutcome> {
        if options.is_async() {
            let job = self.enqueue(op, args, &options).await?;
            return Ok(DispatchOutcome::Queued(job));
        }

        let candidates = self.candidates(&options);
        if candidates.is_empty() {
            return Err(DispatchError::Config(
                "No provider candidates resolved".to_string(),
            ));
        }

        let timeout = Some(Duration::from_secs(self.config.timeout_secs));
        let mut last_err: Option<DispatchError> = None;
        let mut attempted_any = false;

        for name in &candidates {
            let provider = self.registry.resolve(name)?;
            if !supports(provider.as_ref(), op) {
                tracing::debug!(provider = %name, method = %op, "Candidate lacks capability, skipping");
                continue;
            }
            attempted_any = true;

            let context = Context::new(&options);
            let (attempt_args, attempt_options, context) =
                self.apply_before(name, op, args.clone(), options.clone(), context)?;

            let cache_key = self
                .cache
                .enabled(&attempt_options)
                .then(|| self.cache.key(name, op, &attempt_args, &attempt_options));
            if let Some(key) = &cache_key {
                if let Some(hit) = self.cache.get(key) {
                    tracing::debug!(provider = %name, method = %op, "Cache hit");
                    return self.finalize(op, hit, &attempt_options);
                }
            }

            for guard in &self.guards {
                if let Verdict::Deny(reason) =
                    guard.inspect(name, op, &attempt_args, &attempt_options)
                {
                    return Err(DispatchError::PolicyViolation(reason));
                }
            }

            if self.config.hooks_enabled {
                self.emit(&DispatchEvent::BeforeRequest {
                    provider: name.clone(),
                    method: op,
                    args: attempt_args.clone(),
                    options: attempt_options.clone(),
                });
            }

            let result = with_retry(&self.config.retry, timeout, || {
                invoke(provider.as_ref(), op, &attempt_args, &attempt_options)
            })
            .await;

            match result {
                Ok(response) => {
                    if let Some(key) = cache_key {
                        self.cache
                            .put(key, response.clone(), self.cache.ttl(&attempt_options));
                    }

                    let (response, context) = self.apply_after(name, op, response, context)?;

                    if self.config.hooks_enabled {
                        self.emit(&DispatchEvent::AfterRequest {
                            provider: name.clone(),
                            method: op,
                            args: attempt_args.clone(),
                            options: attempt_options.clone(),
                            response: response.clone(),
                        });
                    }

                    self.record_usage(name, op, &response, &attempt_options);
                    self.record_timing(name, op, &context);

                    return self.finalize(op, response, &attempt_options);
                }
                Err(e) if e.allows_fallback() => {
                    self.health.mark_failure(name);
                    tracing::error!(provider = %name, method = %op, error = %e, "Provider candidate failed");
                    if self.config.observability_enabled {
                        metrics::counter!(
                            "dispatch.total",
                            "provider" => name.clone(),
                            "method" => op.as_str(),
                            "status" => "error"
                        )
                        .increment(1);
                    }
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_err {
            Some(e) => Err(e),
            None if !attempted_any && op.required_capability().is_some() => {
                Err(DispatchError::Unsupported(format!(
                    "No candidate provider supports [{}]",
                    op
                )))
            }
            None => Err(DispatchError::Config(
                "No usable provider candidates".to_string(),
            )),
        }
    }

    async fn dispatch_stream(
        &self,
        op: Operation,
        args: Vec<Value>,
        options: Options,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<TextStream> {
        let candidates = self.candidates(&options);
        let mut last_err: Option<DispatchError> = None;

        for name in &candidates {
            let provider = self.registry.resolve(name)?;
            let Some(streaming) = provider.as_streaming() else {
                continue;
            };

            let context = Context::new(&options);
            let (attempt_args, attempt_options, _context) =
                self.apply_before(name, op, args.clone(), options.clone(), context)?;

            for guard in &self.guards {
                if let Verdict::Deny(reason) =
                    guard.inspect(name, op, &attempt_args, &attempt_options)
                {
                    return Err(DispatchError::PolicyViolation(reason));
                }
            }

            if self.config.hooks_enabled {
                self.emit(&DispatchEvent::BeforeRequest {
                    provider: name.clone(),
                    method: op,
                    args: attempt_args.clone(),
                    options: attempt_options.clone(),
                });
            }

            // The handshake may still fall through to the next candidate;
            // failures after the first chunk belong to the consumer.
            let handshake = match op {
                Operation::StreamText => {
                    let prompt = arg_str(&attempt_args, 0, "stream_text")?.to_string();
                    streaming.stream_text(prompt, attempt_options.clone()).await
                }
                Operation::StreamChat => {
                    let messages = arg_array(&attempt_args, 0, "stream_chat")?.to_vec();
                    streaming.stream_chat(messages, attempt_options.clone()).await
                }
                _ => Err(DispatchError::Unsupported(format!(
                    "[{}] is not a streaming operation",
                    op
                ))),
            };

            match handshake {
                Ok(stream) => {
                    tracing::info!(provider = %name, method = %op, "Stream opened");
                    let Some(callback) = on_chunk else {
                        return Ok(stream);
                    };
                    let observed = async_stream::stream! {
                        let mut inner = stream;
                        while let Some(chunk) = inner.next().await {
                            if let Ok(text) = &chunk {
                                callback(text);
                            }
                            yield chunk;
                        }
                    };
                    return Ok(Box::pin(observed));
                }
                Err(e) if e.allows_fallback() => {
                    self.health.mark_failure(name);
                    tracing::error!(provider = %name, method = %op, error = %e, "Stream handshake failed");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Err(DispatchError::Unsupported(format!(
                "No candidate provider supports [{}]",
                op
            ))),
        }
    }

    async fn enqueue(&self, op: Operation, args: Vec<Value>, options: &Options) -> Result<JobHandle> {
        if !self.config.queue.enabled {
            return Err(DispatchError::Config(
                "Queued dispatch is disabled".to_string(),
            ));
        }
        let transport = self.queue.as_ref().ok_or_else(|| {
            DispatchError::Config("No queue transport configured".to_string())
        })?;

        let hint = match options.provider_override() {
            Some(ProviderOverride::Single(name)) => Some(name),
            Some(ProviderOverride::List(names)) => names.into_iter().next(),
            None => None,
        };
        if let Some(name) = &hint {
            self.rate_limiter.admit(name)?;
        }

        let routing = QueueRouting {
            connection: self.config.queue.connection.clone(),
            queue: self.config.queue.queue.clone(),
        };
        let handle = transport.enqueue(op, args, hint, routing).await?;
        tracing::info!(job = %handle.id, method = %op, "Dispatch enqueued");
        Ok(handle)
    }

    /// Ordered candidate list for one call. The router resolves candidates
    /// when routing is enabled; otherwise the explicit override or the
    /// default provider plus the static fallback list. A per-call
    /// `fallback: false` truncates the chain to its primary.
    fn candidates(&self, options: &Options) -> Vec<String> {
        let mut list = if self.config.routing.enabled {
            self.router.resolve(options)
        } else {
            match options.provider_override() {
                Some(ProviderOverride::List(names)) => names,
                Some(ProviderOverride::Single(name)) => {
                    let mut v = vec![name];
                    v.extend(self.config.fallback.providers.iter().cloned());
                    v
                }
                None => {
                    let mut v = vec![self.config.default_provider.clone()];
                    v.extend(self.config.fallback.providers.iter().cloned());
                    v
                }
            }
        };

        let mut seen = std::collections::HashSet::new();
        list.retain(|name| seen.insert(name.clone()));

        if !options.fallback().unwrap_or(self.config.fallback.enabled) {
            list.truncate(1);
        }
        list
    }

    fn apply_before(
        &self,
        provider: &str,
        op: Operation,
        mut args: Vec<Value>,
        mut options: Options,
        mut context: Context,
    ) -> Result<(Vec<Value>, Options, Context)> {
        for middleware in &self.middleware {
            (args, options, context) = middleware.before(provider, op, args, options, context)?;
        }
        Ok((args, options, context))
    }

    fn apply_after(
        &self,
        provider: &str,
        op: Operation,
        mut response: Response,
        mut context: Context,
    ) -> Result<(Response, Context)> {
        for middleware in &self.middleware {
            (response, context) = middleware.after(provider, op, response, context)?;
        }
        Ok((response, context))
    }

    fn record_usage(&self, provider: &str, op: Operation, response: &Response, options: &Options) {
        if response.usage.is_empty() {
            return;
        }

        if self.config.logging_enabled {
            tracing::info!(
                provider = %provider,
                method = %op,
                usage = %serde_json::Value::Object(response.usage.clone()),
                "Provider usage"
            );
        }

        if self.config.usage.events {
            let event_options = if self.config.usage.include_options {
                options.clone()
            } else {
                Options::new()
            };
            let event_response = self
                .config
                .usage
                .include_response
                .then(|| response.clone());
            self.emit(&DispatchEvent::UsageReported {
                provider: provider.to_string(),
                method: op,
                usage: response.usage.clone(),
                options: event_options,
                response: event_response,
            });
        }
    }

    fn record_timing(&self, provider: &str, op: Operation, context: &Context) {
        if !self.config.observability_enabled {
            return;
        }
        let duration_ms = context.elapsed_ms();
        metrics::histogram!(
            "dispatch.duration_seconds",
            "provider" => provider.to_string(),
            "method" => op.as_str()
        )
        .record(duration_ms / 1000.0);
        metrics::counter!(
            "dispatch.total",
            "provider" => provider.to_string(),
            "method" => op.as_str(),
            "status" => "success"
        )
        .increment(1);
        self.emit(&DispatchEvent::RequestTimed {
            provider: provider.to_string(),
            method: op,
            duration_ms,
            trace_id: context.trace_id.clone(),
        });
    }

    fn finalize(&self, op: Operation, response: Response, options: &Options) -> Result<DispatchOutcome> {
        if let Some(schema) = options.response_schema() {
            crate::schema::validate_response(&response, schema)?;
        }
        if options.dto().unwrap_or(self.config.dto_enabled) {
            return Ok(DispatchOutcome::Typed(TypedResponse::project(op, response)));
        }
        Ok(DispatchOutcome::Response(response))
    }

    fn emit(&self, event: &DispatchEvent) {
        for sink in &self.sinks {
            sink.handle(event);
        }
    }
}

fn supports(provider: &dyn Provider, op: Operation) -> bool {
    use crate::api::Capability;
    match op.required_capability() {
        None => true,
        Some(Capability::Vision) => provider.as_vision().is_some(),
        Some(Capability::Audio) => provider.as_audio().is_some(),
        Some(Capability::Streaming) => provider.as_streaming().is_some(),
    }
}

async fn invoke(
    provider: &dyn Provider,
    op: Operation,
    args: &[Value],
    options: &Options,
) -> Result<Response> {
    match op {
        Operation::Text => provider.text(arg_str(args, 0, "text")?, options).await,
        Operation::Chat => provider.chat(arg_array(args, 0, "chat")?, options).await,
        Operation::Image => provider.image(arg_str(args, 0, "image")?, options).await,
        Operation::Summarize | Operation::SummarizeFile => {
            provider
                .summarize(arg_str(args, 0, "summarize")?, options)
                .await
        }
        Operation::Embeddings | Operation::EmbeddingsFile => {
            let input = args.first().ok_or_else(|| {
                DispatchError::Config("embeddings requires an input argument".to_string())
            })?;
            provider.embeddings(input, options).await
        }
        Operation::Vision => {
            let vision = provider.as_vision().ok_or_else(|| {
                DispatchError::Unsupported(format!(
                    "Provider [{}] does not support vision",
                    provider.name()
                ))
            })?;
            let images = args.get(1).ok_or_else(|| {
                DispatchError::Config("vision requires an images argument".to_string())
            })?;
            vision
                .vision(arg_str(args, 0, "vision")?, images, options)
                .await
        }
        Operation::Transcribe => {
            let audio = provider.as_audio().ok_or_else(|| {
                DispatchError::Unsupported(format!(
                    "Provider [{}] does not support audio",
                    provider.name()
                ))
            })?;
            audio.transcribe(arg_str(args, 0, "transcribe")?, options).await
        }
        Operation::Speak => {
            let audio = provider.as_audio().ok_or_else(|| {
                DispatchError::Unsupported(format!(
                    "Provider [{}] does not support audio",
                    provider.name()
                ))
            })?;
            audio.speak(arg_str(args, 0, "speak")?, options).await
        }
        Operation::StreamText | Operation::StreamChat | Operation::Recommend => {
            Err(DispatchError::Unsupported(format!(
                "[{}] has a dedicated dispatch surface",
                op
            )))
        }
    }
}

fn arg_str<'a>(args: &'a [Value], index: usize, op: &str) -> Result<&'a str> {
    args.get(index).and_then(Value::as_str).ok_or_else(|| {
        DispatchError::Config(format!("{} requires a string argument at position {}", op, index))
    })
}

fn arg_array<'a>(args: &'a [Value], index: usize, op: &str) -> Result<&'a [Value]> {
    args.get(index)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| {
            DispatchError::Config(format!("{} requires an array argument at position {}", op, index))
        })
}

fn read_file_input(path: &str) -> Result<String> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ext == "pdf" {
        return Err(DispatchError::Unsupported(
            "PDF extraction is not supported; extract the text before dispatching".to_string(),
        ));
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        DispatchError::Config(format!("Failed to read file '{}': {}", path, e))
    })?;

    let text = if ext == "html" || ext == "htm" {
        let stripped = TAG_RE.replace_all(&contents, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        contents
    };
    Ok(text.trim().to_string())
}
