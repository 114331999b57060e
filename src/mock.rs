//! Configurable mock provider for unit tests.

use crate::api::{Options, Response};
use crate::error::{DispatchError, Result};
use crate::traits::{
    AudioProvider, Provider, StreamingProvider, TextStream, VisionProvider,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU32, Ordering};

/// A scriptable in-memory provider.
///
/// Counts invocations, optionally fails its first N calls with a chosen
/// status, and advertises the optional capabilities it was built with.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    content: String,
    embeddings: Option<Vec<Value>>,
    usage: Map<String, Value>,
    fail_first: AtomicU32,
    fail_status: Option<u16>,
    chunks: Vec<String>,
    vision: bool,
    audio: bool,
    streaming: bool,
    calls: AtomicU32,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            content: "mock response".to_string(),
            embeddings: None,
            usage: Map::new(),
            fail_first: AtomicU32::new(0),
            fail_status: None,
            chunks: Vec::new(),
            vision: false,
            audio: false,
            streaming: false,
            calls: AtomicU32::new(0),
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

    /// Fail the first `n` invocations with `status` (`None` for a
    /// transport-level failure).
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

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn attempt(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
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

    async fn text(&self, _prompt: &str, _options: &Options) -> Result<Response> {
        self.attempt()?;
        Ok(self.response())
    }

    async fn chat(&self, _messages: &[Value], _options: &Options) -> Result<Response> {
        self.attempt()?;
        Ok(self.response())
    }

    async fn image(&self, _prompt: &str, _options: &Options) -> Result<Response> {
        self.attempt()?;
        Ok(Response {
            images: Some(vec![json!({"url": "https://example.test/img.png"})]),
            ..Response::default()
        })
    }

    async fn summarize(&self, _text: &str, _options: &Options) -> Result<Response> {
        self.attempt()?;
        Ok(self.response())
    }

    async fn embeddings(&self, input: &Value, _options: &Options) -> Result<Response> {
        self.attempt()?;
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
    async fn vision(&self, prompt: &str, _images: &Value, _options: &Options) -> Result<Response> {
        self.attempt()?;
        Ok(Response::from_content(format!("vision: {}", prompt)))
    }
}

#[async_trait]
impl AudioProvider for MockProvider {
    async fn transcribe(&self, _path: &str, _options: &Options) -> Result<Response> {
        self.attempt()?;
        Ok(Response {
            text: Some("transcribed".to_string()),
            ..Response::default()
        })
    }

    async fn speak(&self, _text: &str, _options: &Options) -> Result<Response> {
        self.attempt()?;
        Ok(Response {
            audio: Some("bW9jaw==".to_string()),
            format: Some("mp3".to_string()),
            ..Response::default()
        })
    }
}

#[async_trait]
impl StreamingProvider for MockProvider {
    async fn stream_text(&self, _prompt: String, _options: Options) -> Result<TextStream> {
        self.attempt()?;
        Ok(futures::stream::iter(self.chunks.clone().into_iter().map(Ok)).boxed())
    }

    async fn stream_chat(&self, _messages: Vec<Value>, _options: Options) -> Result<TextStream> {
        self.attempt()?;
        Ok(futures::stream::iter(self.chunks.clone().into_iter().map(Ok)).boxed())
    }
}
