//! Provider-agnostic AI request dispatcher.
//!
//! One façade accepts abstract operations (text, chat, image, summarize,
//! vision, embeddings, transcribe, speak, streaming, recommend) and routes
//! each to interchangeable backend [`Provider`]s, applying caching, retries
//! with exponential backoff, health-aware routing and fallback, middleware,
//! content policies, queue admission control, usage accounting, and optional
//! response schema validation along the way.
//!
//! ```no_run
//! use polyrelay::{Dispatcher, Options};
//!
//! # async fn run() -> polyrelay::Result<()> {
//! let dispatcher = Dispatcher::builder().build();
//! let outcome = dispatcher.text("Say hello", Options::new()).await?;
//! let response = outcome.into_response()?;
//! println!("{}", response.content.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod dispatcher;
pub mod dto;
pub mod error;
pub mod health;
pub mod hooks;
pub mod middleware;
pub mod policy;
pub mod rag;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod routing;
pub mod schema;
pub mod similarity;
pub mod store;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use api::{
    DispatchOutcome, DispatcherConfig, JobHandle, Operation, Options, Response, config_from_file,
    config_from_str,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use dto::TypedResponse;
pub use error::{DispatchError, Result};
pub use rag::{InMemoryVectorStore, VectorItem, VectorMatch, VectorStore};
pub use retry::RetryPolicy;
pub use similarity::{Recommendation, RecommendResponse};
pub use traits::{
    AudioProvider, Provider, QueueTransport, StreamingProvider, TextStream, VisionProvider,
};
