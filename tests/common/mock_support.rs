//! Shared test doubles for the integration suite.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use polyrelay::api::{JobHandle, Operation, Options, Response};
use polyrelay::error::{DispatchError, Result};
use polyrelay::traits::{
    AudioProvider, Provider, QueueRouting, QueueTransport, StreamingProvider, TextStream,
    VisionProvider,
};
use serde_json::{Map, Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Install a fmt subscriber writing through the test harness. Safe to call
/// from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Scriptable provider: counts calls, fails its first N invocations, and
/// advertises only the capabilities it was built with.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    content: String,
    embeddings: Option<Vec<Value>>,
    usage: Map<String, Value>,
    fail_first: AtomicU32,
    fail_status: Option<u16>,
    chunks: Vec<String>,
    fail_handshake: bool,
    vision: bool,
    audio: bool,
    streaming: bool,
    calls: AtomicU32,
    last_args: Mutex<Option<Value>>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            content: format!("{} response", name),
            embeddings: None,
            usage: Map::new(),
            fail_first: AtomicU32::new(0),
            fail_status: None,
            chunks: Vec::new(),
            fail_handshake: false,
            vision: false,
            audio: false,
            streaming: false,
            calls: AtomicU32::new(0),
            last_args: Mutex::new(None),
        }
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }

    pub fn with_usage(mut self, usage: Value) -> Self {
        self.usage = usage.as_object().cloned().unwrap_or_default();
        self
    }

    pub fn with_embeddings(mut self, embeddings: Vec<Value>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Fail the first `n` invocations with `status`; `None` simulates a
    /// transport-level failure.
    pub fn failing(mut self, n: u32, status: Option<u16>) -> Self {
        self.fail_first = AtomicU32::new(n);
        self.fail_status = status;
        self
    }

    pub fn with_vision(mut self) -> Self {
        self.vision = true;
        self
    }

    pub fn with_audio(mut self) -> Self {
        self.audio = true;
        self
    }

    pub fn with_streaming(mut self, chunks: &[&str]) -> Self {
        self.streaming = true;
        self.chunks = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Streaming capability whose handshake always fails.
    pub fn with_broken_streaming(mut self) -> Self {
        self.streaming = true;
        self.fail_handshake = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The positional argument seen by the most recent invocation.
    pub fn last_args(&self) -> Option<Value> {
        self.last_args.lock().unwrap().clone()
    }

    fn attempt(&self, args: Value) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = Some(args);
        let failing = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DispatchError::ProviderCall {
                provider: self.name.clone(),
                status: self.fail_status,
                message: "induced failure".to_string(),
            });
        }
        Ok(())
    }

    fn response(&self) -> Response {
        Response {
            content: Some(self.content.clone()),
            raw: json!({"provider": self.name}),
            usage: self.usage.clone(),
            ..Response::default()
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn text(&self, prompt: &str, _options: &Options) -> Result<Response> {
        self.attempt(json!(prompt))?;
        Ok(self.response())
    }

    async fn chat(&self, messages: &[Value], _options: &Options) -> Result<Response> {
        self.attempt(Value::Array(messages.to_vec()))?;
        Ok(self.response())
    }

    async fn image(&self, prompt: &str, _options: &Options) -> Result<Response> {
        self.attempt(json!(prompt))?;
        Ok(Response {
            images: Some(vec![json!({"url": "https://example.test/img.png"})]),
            ..Response::default()
        })
    }

    async fn summarize(&self, text: &str, _options: &Options) -> Result<Response> {
        self.attempt(json!(text))?;
        Ok(self.response())
    }

    async fn embeddings(&self, input: &Value, _options: &Options) -> Result<Response> {
        self.attempt(input.clone())?;
        let embeddings = match &self.embeddings {
            Some(vectors) => vectors.clone(),
            None => {
                let count = input.as_array().map_or(1, Vec::len);
                (0..count).map(|_| json!([0.1, 0.2, 0.3])).collect()
            }
        };
        Ok(Response {
            embeddings: Some(embeddings),
            usage: self.usage.clone(),
            ..Response::default()
        })
    }

    fn as_vision(&self) -> Option<&dyn VisionProvider> {
        self.vision.then_some(self)
    }

    fn as_audio(&self) -> Option<&dyn AudioProvider> {
        self.audio.then_some(self)
    }

    fn as_streaming(&self) -> Option<&dyn StreamingProvider> {
        self.streaming.then_some(self)
    }
}

#[async_trait]
impl VisionProvider for MockProvider {
    async fn vision(&self, prompt: &str, images: &Value, _options: &Options) -> Result<Response> {
        self.attempt(json!([prompt, images]))?;
        Ok(Response::from_content(format!("vision: {}", prompt)))
    }
}

#[async_trait]
impl AudioProvider for MockProvider {
    async fn transcribe(&self, path: &str, _options: &Options) -> Result<Response> {
        self.attempt(json!(path))?;
        Ok(Response {
            text: Some("transcribed".to_string()),
            ..Response::default()
        })
    }

    async fn speak(&self, text: &str, _options: &Options) -> Result<Response> {
        self.attempt(json!(text))?;
        Ok(Response {
            audio: Some("bW9jaw==".to_string()),
            format: Some("mp3".to_string()),
            ..Response::default()
        })
    }
}

#[async_trait]
impl StreamingProvider for MockProvider {
    async fn stream_text(&self, prompt: String, _options: Options) -> Result<TextStream> {
        self.attempt(json!(prompt))?;
        if self.fail_handshake {
            return Err(DispatchError::ProviderCall {
                provider: self.name.clone(),
                status: None,
                message: "handshake refused".to_string(),
            });
        }
        Ok(futures::stream::iter(self.chunks.clone().into_iter().map(Ok)).boxed())
    }

    async fn stream_chat(&self, messages: Vec<Value>, _options: Options) -> Result<TextStream> {
        self.attempt(Value::Array(messages))?;
        if self.fail_handshake {
            return Err(DispatchError::ProviderCall {
                provider: self.name.clone(),
                status: None,
                message: "handshake refused".to_string(),
            });
        }
        Ok(futures::stream::iter(self.chunks.clone().into_iter().map(Ok)).boxed())
    }
}

/// One recorded enqueue.
#[derive(Debug, Clone)]
pub struct EnqueuedJob {
    pub action: Operation,
    pub args: Vec<Value>,
    pub provider: Option<String>,
    pub routing: QueueRouting,
}

/// Queue transport that records every enqueue and hands back sequential ids.
#[derive(Default)]
pub struct MockQueueTransport {
    jobs: Mutex<Vec<EnqueuedJob>>,
    next_id: AtomicU32,
}

impl MockQueueTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<EnqueuedJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueTransport for MockQueueTransport {
    async fn enqueue(
        &self,
        action: Operation,
        args: Vec<Value>,
        provider: Option<String>,
        routing: QueueRouting,
    ) -> Result<JobHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap().push(EnqueuedJob {
            action,
            args: args.clone(),
            provider: provider.clone(),
            routing,
        });
        Ok(JobHandle {
            id: format!("job-{}", id),
            action,
            provider,
        })
    }
}
