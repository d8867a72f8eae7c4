//! `threadMode` controls whether the thread chip's estimate includes editor
//! text (spec.md §4.6): `withEditors` counts `all`, `ignoreEditors` counts
//! `threadOnly` only.

use std::sync::Arc;

use async_trait::async_trait;
use queue_engine::config::{ThreadMode, TokenApproximatorSettings};
use queue_engine::token::approximator::{ChipKind, ChipStatus, DomTextSource, TokenApproximator};
use queue_engine::token::{EstimatorTexts, EstimatorWorker};

struct FixedSource;

#[async_trait]
impl DomTextSource for FixedSource {
    async fn snapshot(&self) -> EstimatorTexts {
        EstimatorTexts {
            all: "short thread. ".repeat(1) + &"x".repeat(5000),
            thread_only: "short thread.".to_string(),
            editors_only: "x".repeat(5000),
        }
    }
}

async fn next_fresh_thread_value(
    events: &mut tokio::sync::broadcast::Receiver<queue_engine::token::ChipEvent>,
) -> String {
    loop {
        let event = events.recv().await.unwrap();
        if event.kind == ChipKind::Thread && event.status == ChipStatus::Fresh {
            return event.value;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn with_editors_counts_more_than_ignore_editors() {
    let worker = Arc::new(EstimatorWorker::with_builtin_models());

    // Pin the char-count model so the 5000-byte editor padding actually
    // moves the estimate; the default model counts character-class runs,
    // not lengths, and wouldn't distinguish these two texts as clearly.
    let with_editors = TokenApproximatorSettings {
        enabled: true,
        thread_mode: ThreadMode::WithEditors,
        counting_method: "simple".to_string(),
        ..Default::default()
    };
    let (approximator_a, mut events_a) = TokenApproximator::new(Arc::new(FixedSource), worker.clone(), with_editors);
    approximator_a.notify_thread_activity();
    let value_with_editors = next_fresh_thread_value(&mut events_a).await;

    let ignore_editors = TokenApproximatorSettings {
        enabled: true,
        thread_mode: ThreadMode::IgnoreEditors,
        counting_method: "simple".to_string(),
        ..Default::default()
    };
    let (approximator_b, mut events_b) = TokenApproximator::new(Arc::new(FixedSource), worker, ignore_editors);
    approximator_b.notify_thread_activity();
    let value_ignore_editors = next_fresh_thread_value(&mut events_b).await;

    // with_editors counts the 5000-char editor padding too; ignore_editors
    // sees only the short thread text, so its estimate must be the smaller.
    fn approx_value(s: &str) -> u64 {
        if let Some(rest) = s.strip_suffix('k') {
            rest.parse::<u64>().unwrap() * 1000
        } else {
            s.trim_start_matches('<').parse().unwrap()
        }
    }
    assert!(
        approx_value(&value_with_editors) > approx_value(&value_ignore_editors),
        "with-editors ({value_with_editors}) must exceed ignore-editors ({value_ignore_editors})"
    );

    approximator_a.shutdown().await;
    approximator_b.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disabled_approximator_ignores_activity_notifications() {
    let worker = Arc::new(EstimatorWorker::with_builtin_models());
    let settings = TokenApproximatorSettings { enabled: false, ..Default::default() };
    let (approximator, mut events) = TokenApproximator::new(Arc::new(FixedSource), worker, settings);

    approximator.notify_thread_activity();
    approximator.notify_editor_input();
    tokio::time::advance(std::time::Duration::from_secs(20)).await;
    tokio::task::yield_now().await;

    let result = tokio::time::timeout(std::time::Duration::from_millis(10), events.recv()).await;
    assert!(result.is_err(), "a disabled approximator must not emit chip events");

    approximator.shutdown().await;
}
