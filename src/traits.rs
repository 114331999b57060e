//! Capability interfaces the dispatcher consumes: providers, optional
//! provider extensions, and the queue transport collaborator.

use crate::api::{JobHandle, Operation, Options, Response};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A lazily-pulled, single-pass sequence of text fragments.
///
/// Not restartable and not parallel: one cooperative pull-driven stream.
/// Abandoning the stream (dropping it) must not leak transport resources.
pub type TextStream = futures::stream::BoxStream<'static, Result<String>>;

/// A backend that serves the universally-supported operations.
///
/// Optional capabilities (vision, audio, streaming) are probed per provider
/// at call time via the `as_*` accessors rather than assumed; the default
/// implementations advertise nothing.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Unique provider name used for routing, health, and cache keys.
    fn name(&self) -> &str;

    /// Generate text from a prompt.
    async fn text(&self, prompt: &str, options: &Options) -> Result<Response>;

    /// Run a chat completion over role-based messages.
    async fn chat(&self, messages: &[Value], options: &Options) -> Result<Response>;

    /// Generate images from a prompt.
    async fn image(&self, prompt: &str, options: &Options) -> Result<Response>;

    /// Summarize a long text input.
    async fn summarize(&self, text: &str, options: &Options) -> Result<Response>;

    /// Generate embeddings for a text or an array of texts.
    async fn embeddings(&self, input: &Value, options: &Options) -> Result<Response>;

    /// Image-understanding extension, when implemented.
    fn as_vision(&self) -> Option<&dyn VisionProvider> {
        None
    }

    /// Audio extension (transcription/speech), when implemented.
    fn as_audio(&self) -> Option<&dyn AudioProvider> {
        None
    }

    /// Streaming extension, when implemented.
    fn as_streaming(&self) -> Option<&dyn StreamingProvider> {
        None
    }
}

/// Optional image-understanding capability.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Run a vision prompt against one or more images (a string or an array
    /// of strings).
    async fn vision(&self, prompt: &str, images: &Value, options: &Options) -> Result<Response>;
}

/// Optional audio capability: transcription and speech synthesis.
#[async_trait]
pub trait AudioProvider: Send + Sync {
    /// Transcribe an audio file from a local path.
    async fn transcribe(&self, path: &str, options: &Options) -> Result<Response>;

    /// Generate speech audio for the given text.
    async fn speak(&self, text: &str, options: &Options) -> Result<Response>;
}

/// Optional incremental-response capability.
///
/// The handshake (this call) may fail and trigger candidate fallback; once
/// the returned stream has yielded a chunk, downstream failures propagate to
/// the consumer instead.
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    /// Stream text chunks from a prompt.
    async fn stream_text(&self, prompt: String, options: Options) -> Result<TextStream>;

    /// Stream chat chunks from role-based messages.
    async fn stream_chat(&self, messages: Vec<Value>, options: Options) -> Result<TextStream>;
}

/// Routing hints forwarded to the queue transport from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueRouting {
    /// Optional named connection.
    pub connection: Option<String>,
    /// Optional named queue.
    pub queue: Option<String>,
}

/// Fire-and-forget submission of an asynchronous unit of work.
///
/// At-least-once delivery is assumed; the dispatcher only needs a handle
/// back.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Enqueue `action` with its positional args and an optional provider
    /// hint, returning a transport-assigned handle.
    async fn enqueue(
        &self,
        action: Operation,
        args: Vec<Value>,
        provider: Option<String>,
        routing: QueueRouting,
    ) -> Result<JobHandle>;
}
