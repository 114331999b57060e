//! Streaming dispatch: chunk delivery, observers, and handshake fallback.

mod common;

use common::mock_support::MockProvider;
use futures::StreamExt;
use polyrelay::api::{DispatcherConfig, Options};
use polyrelay::dispatcher::Dispatcher;
use polyrelay::error::DispatchError;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn fast_config() -> DispatcherConfig {
    let mut config = DispatcherConfig::default();
    config.retry.base_sleep_ms = 1;
    config
}

async fn collect(stream: polyrelay::TextStream) -> String {
    stream
        .filter_map(|chunk| async move { chunk.ok() })
        .collect::<Vec<_>>()
        .await
        .concat()
}

#[tokio::test]
async fn stream_text_yields_chunks_in_order() {
    let dispatcher = Dispatcher::builder()
        .config(fast_config())
        .provider(Arc::new(
            MockProvider::new("openai").with_streaming(&["Hel", "lo"]),
        ))
        .build();

    let stream = dispatcher.stream_text("greet", Options::new()).await.unwrap();
    assert_eq!(collect(stream).await, "Hello");
}

#[tokio::test]
async fn stream_chat_yields_chunks_in_order() {
    let dispatcher = Dispatcher::builder()
        .config(fast_config())
        .provider(Arc::new(
            MockProvider::new("openai").with_streaming(&["one ", "two"]),
        ))
        .build();

    let stream = dispatcher
        .stream_chat(
            vec![json!({"role": "user", "content": "count"})],
            Options::new(),
        )
        .await
        .unwrap();
    assert_eq!(collect(stream).await, "one two");
}

#[tokio::test]
async fn chunk_callback_observes_each_chunk_before_yield() {
    let dispatcher = Dispatcher::builder()
        .config(fast_config())
        .provider(Arc::new(
            MockProvider::new("openai").with_streaming(&["a", "b", "c"]),
        ))
        .build();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let stream = dispatcher
        .stream_text_with(
            "observe",
            Options::new(),
            Arc::new(move |chunk: &str| seen_cb.lock().unwrap().push(chunk.to_string())),
        )
        .await
        .unwrap();

    let collected = collect(stream).await;
    assert_eq!(collected, "abc");
    assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn handshake_failure_falls_back_to_the_next_streaming_candidate() {
    let broken = Arc::new(MockProvider::new("openai").with_broken_streaming());
    let claude = Arc::new(MockProvider::new("claude").with_streaming(&["ok"]));

    let mut config = fast_config();
    config.fallback.providers = vec!["claude".to_string()];
    let dispatcher = Dispatcher::builder()
        .config(config)
        .provider(broken.clone())
        .provider(claude.clone())
        .build();

    let stream = dispatcher.stream_text("try", Options::new()).await.unwrap();
    assert_eq!(collect(stream).await, "ok");
    assert!(!dispatcher.health().is_healthy("openai"));
}

#[tokio::test]
async fn non_streaming_candidates_are_skipped() {
    let plain = Arc::new(MockProvider::new("openai"));
    let claude = Arc::new(MockProvider::new("claude").with_streaming(&["via claude"]));

    let mut config = fast_config();
    config.fallback.providers = vec!["claude".to_string()];
    let dispatcher = Dispatcher::builder()
        .config(config)
        .provider(plain.clone())
        .provider(claude)
        .build();

    let stream = dispatcher.stream_text("skip", Options::new()).await.unwrap();
    assert_eq!(collect(stream).await, "via claude");
    assert_eq!(plain.calls(), 0);
}

#[tokio::test]
async fn no_streaming_capability_anywhere_is_unsupported() {
    let dispatcher = Dispatcher::builder()
        .config(fast_config())
        .provider(Arc::new(MockProvider::new("openai")))
        .build();

    let err = dispatcher
        .stream_text("nope", Options::new())
        .await
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, DispatchError::Unsupported(_)));
}
