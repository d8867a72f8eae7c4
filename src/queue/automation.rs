//! Pre-dispatch side-effects: auto-scroll, beep, speak, and the finish tone.
//!
//! All four must fail quietly — a blocked audio API or an absent speech
//! engine never stops a dispatch. `SchedulerHandle` runs them synchronously,
//! in the order auto-scroll -> beep -> speak, and treats every call as
//! best-effort regardless of its result.

use async_trait::async_trait;

/// Host-provided pre-dispatch automation. The default [`NoopAutomation`]
/// only logs, for hosts (and tests) with no DOM/audio surface to drive.
#[async_trait]
pub trait QueueAutomation: Send + Sync {
    /// Scroll every scrollable region to bottom (three times in succession,
    /// per spec.md's dispatch algorithm), if enabled.
    async fn auto_scroll(&self);

    /// Play a short pre-send tone, if enabled.
    async fn beep_before_send(&self);

    /// Speak "Next item", cancelling any already-queued utterance first, if enabled.
    async fn speak_before_send(&self);

    /// Play a distinct tone on queue completion, if enabled.
    async fn beep_on_finish(&self);
}

/// A `QueueAutomation` that only logs; suitable for hosts with no DOM/audio
/// surface (the demo binary, and any test that doesn't assert on automation
/// call order).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAutomation;

#[async_trait]
impl QueueAutomation for NoopAutomation {
    async fn auto_scroll(&self) {
        log::debug!("automation: auto-scroll");
    }
    async fn beep_before_send(&self) {
        log::debug!("automation: beep before send");
    }
    async fn speak_before_send(&self) {
        log::debug!("automation: speak \"Next item\"");
    }
    async fn beep_on_finish(&self) {
        log::debug!("automation: beep on finish");
    }
}
