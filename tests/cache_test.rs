//! Response cache behavior through the full dispatch path.

mod common;

use common::mock_support::MockProvider;
use polyrelay::api::{DispatchOutcome, DispatcherConfig, Options};
use polyrelay::dispatcher::Dispatcher;
use polyrelay::hooks::{DispatchEvent, EventSink};
use std::sync::{Arc, Mutex};

fn cached_config() -> DispatcherConfig {
    let mut config = DispatcherConfig::default();
    config.cache.enabled = true;
    config.retry.base_sleep_ms = 1;
    config
}

struct CountingSink {
    count: Mutex<u32>,
}

impl CountingSink {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
        }
    }

    fn count(&self) -> u32 {
        *self.count.lock().unwrap()
    }
}

impl EventSink for CountingSink {
    fn handle(&self, _event: &DispatchEvent) {
        *self.count.lock().unwrap() += 1;
    }
}

#[tokio::test]
async fn identical_calls_are_served_from_cache() {
    let openai = Arc::new(MockProvider::new("openai").with_content("cached answer"));
    let dispatcher = Dispatcher::builder()
        .config(cached_config())
        .provider(openai.clone())
        .build();

    let first = dispatcher
        .text("same prompt", Options::new())
        .await
        .unwrap()
        .into_response()
        .unwrap();
    let second = dispatcher
        .text("same prompt", Options::new())
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(openai.calls(), 1);
}

#[tokio::test]
async fn different_args_miss_the_cache() {
    let openai = Arc::new(MockProvider::new("openai"));
    let dispatcher = Dispatcher::builder()
        .config(cached_config())
        .provider(openai.clone())
        .build();

    dispatcher.text("prompt one", Options::new()).await.unwrap();
    dispatcher.text("prompt two", Options::new()).await.unwrap();
    assert_eq!(openai.calls(), 2);
}

#[tokio::test]
async fn per_call_cache_option_overrides_a_disabled_default() {
    let openai = Arc::new(MockProvider::new("openai"));
    // Cache disabled globally.
    let mut config = DispatcherConfig::default();
    config.retry.base_sleep_ms = 1;
    let dispatcher = Dispatcher::builder()
        .config(config)
        .provider(openai.clone())
        .build();

    let options = Options::new().with("cache", true);
    dispatcher.text("opt in", options.clone()).await.unwrap();
    dispatcher.text("opt in", options).await.unwrap();
    assert_eq!(openai.calls(), 1);

    // And without the option the default still applies.
    dispatcher.text("no cache", Options::new()).await.unwrap();
    dispatcher.text("no cache", Options::new()).await.unwrap();
    assert_eq!(openai.calls(), 3);
}

#[tokio::test]
async fn cache_hits_emit_no_events() {
    let sink = Arc::new(CountingSink::new());
    let dispatcher = Dispatcher::builder()
        .config(cached_config())
        .provider(Arc::new(MockProvider::new("openai")))
        .event_sink(sink.clone())
        .build();

    dispatcher.text("quiet", Options::new()).await.unwrap();
    let after_first = sink.count();
    assert!(after_first > 0);

    dispatcher.text("quiet", Options::new()).await.unwrap();
    assert_eq!(sink.count(), after_first);
}

#[tokio::test]
async fn cached_responses_still_project_typed_outcomes() {
    let dispatcher = Dispatcher::builder()
        .config(cached_config())
        .provider(Arc::new(MockProvider::new("openai").with_content("typed")))
        .build();

    dispatcher.text("shape", Options::new()).await.unwrap();
    let outcome = dispatcher
        .text("shape", Options::new().with("dto", true))
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Typed(_)));
}
