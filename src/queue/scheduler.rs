//! The timed dispatch loop: jittered delay, pause/resume, skip, seek, and
//! finish signaling.
//!
//! Owns its [`QueueModel`] exclusively inside a single spawned task, the same
//! shape as a classic single-task-owns-the-queue scheduler: callers only ever
//! reach it through a [`SchedulerHandle`] backed by an `mpsc` command queue,
//! so there is never a second writer to race against. A command loop
//! alternates `select!`-ing on the next command and an optional armed timer
//! future, rather than polling on a fixed tick, since the scheduler's delays
//! range from milliseconds (skip) to tens of thousands of milliseconds
//! (minutes-scale queue delay) and a fixed tick would either waste cycles or
//! blow dispatch-time precision.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::queue::automation::QueueAutomation;
use crate::queue::model::{QueueFullError, QueueItem, QueueModel};
use crate::site::{DispatchOutcome, SiteAdapter};

/// One draw of the delay used to arm the next dispatch timer.
#[derive(Debug, Clone, Copy)]
pub struct DelaySample {
    pub base_ms: u64,
    pub offset_ms: i64,
    pub total_ms: u64,
    pub percent: u32,
    pub timestamp: DateTime<Utc>,
}

/// The delay tunables a scheduler dispatches against; derived from the
/// active `Profile`'s `queue_delay_*`/`queue_randomize_*` fields by the host.
#[derive(Debug, Clone, Copy)]
pub struct DelayParams {
    pub base_ms: u64,
    pub randomize_enabled: bool,
    pub randomize_percent: u32,
}

/// `Idle -> (enqueue) -> Idle(items>0) -> (start) -> Running(dispatching) ->
/// Waiting(timer) -> Running(dispatching) -> ... -> Finished`. `Paused` is
/// reachable from `Waiting` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Waiting,
    Paused,
    Finished,
}

/// One-shot and ongoing notifications a host subscribes to, in place of
/// polling `snapshot()` after every command.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Dispatched { queue_id: Uuid, text: String },
    /// A single user-visible failure, surfaced once per dispatch attempt.
    Toast(String),
    Finished,
}

/// A point-in-time view of the scheduler's state, returned by `snapshot()`.
#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    pub run_state: RunState,
    pub queued: usize,
    pub finished: bool,
    pub remaining_on_pause_ms: u64,
    pub last_delay_sample: Option<DelaySample>,
}

enum Command {
    Enqueue(QueueItem, oneshot::Sender<Result<(), QueueFullError>>),
    Start,
    Pause,
    Reset,
    Skip,
    SeekToRatio(f64),
    RecalculateRunningTimer,
    UpdateDelayParams(DelayParams),
    Snapshot(oneshot::Sender<SchedulerSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Cheap-to-clone front for the scheduler's actor task.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    pub async fn enqueue(&self, item: QueueItem) -> Result<(), QueueFullError> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Enqueue(item, tx)).is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    pub fn start(&self) {
        let _ = self.tx.send(Command::Start);
    }

    pub fn pause(&self) {
        let _ = self.tx.send(Command::Pause);
    }

    pub fn reset(&self) {
        let _ = self.tx.send(Command::Reset);
    }

    pub fn skip(&self) {
        let _ = self.tx.send(Command::Skip);
    }

    pub fn seek_to_ratio(&self, r: f64) {
        let _ = self.tx.send(Command::SeekToRatio(r.clamp(0.0, 1.0)));
    }

    pub fn recalculate_running_timer(&self) {
        let _ = self.tx.send(Command::RecalculateRunningTimer);
    }

    pub fn update_delay_params(&self, params: DelayParams) {
        let _ = self.tx.send(Command::UpdateDelayParams(params));
    }

    pub async fn snapshot(&self) -> Option<SchedulerSnapshot> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Shutdown(tx));
        let _ = rx.await;
    }
}

fn sample_delay(params: DelayParams) -> DelaySample {
    let base_ms = params.base_ms;
    if !params.randomize_enabled || params.randomize_percent == 0 {
        return DelaySample {
            base_ms,
            offset_ms: 0,
            total_ms: base_ms,
            percent: params.randomize_percent,
            timestamp: Utc::now(),
        };
    }
    let mut rng = rand::thread_rng();
    let max_fraction = params.randomize_percent as f64 / 100.0;
    let u: f64 = rng.gen_range(0.0..=max_fraction);
    let sign: f64 = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    let offset_ms = (base_ms as f64 * u * sign).round() as i64;
    let total_ms = (base_ms as i64 + offset_ms).max(0) as u64;
    DelaySample {
        base_ms,
        offset_ms,
        total_ms,
        percent: params.randomize_percent,
        timestamp: Utc::now(),
    }
}

/// Spawn the scheduler actor and return a handle to it.
pub fn start_scheduler(
    delay_params: DelayParams,
    adapter: Arc<dyn SiteAdapter>,
    automation: Arc<dyn QueueAutomation>,
) -> (SchedulerHandle, broadcast::Receiver<SchedulerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel::<Command>();
    let (events_tx, events_rx) = broadcast::channel(64);
    let handle = SchedulerHandle { tx };

    tokio::spawn(run_actor(rx, delay_params, adapter, automation, events_tx));

    (handle, events_rx)
}

struct Actor {
    items: QueueModel,
    run_state: RunState,
    remaining_on_pause_ms: u64,
    last_delay_sample: Option<DelaySample>,
    delay_params: DelayParams,
    deadline: Option<Instant>,
    adapter: Arc<dyn SiteAdapter>,
    automation: Arc<dyn QueueAutomation>,
    events_tx: broadcast::Sender<SchedulerEvent>,
}

async fn run_actor(
    mut rx: mpsc::UnboundedReceiver<Command>,
    delay_params: DelayParams,
    adapter: Arc<dyn SiteAdapter>,
    automation: Arc<dyn QueueAutomation>,
    events_tx: broadcast::Sender<SchedulerEvent>,
) {
    let mut actor = Actor {
        items: QueueModel::new(),
        run_state: RunState::Idle,
        remaining_on_pause_ms: 0,
        last_delay_sample: None,
        delay_params,
        deadline: None,
        adapter,
        automation,
        events_tx,
    };

    loop {
        let timer = async {
            match actor.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        if actor.handle_command(cmd).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = timer, if actor.deadline.is_some() => {
                actor.deadline = None;
                actor.run_state = RunState::Running;
                actor.dispatch_and_advance(true).await;
            }
        }
    }
    log::debug!("queue scheduler actor terminated");
}

impl Actor {
    /// Returns `true` when the actor should shut down.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Enqueue(item, resp) => {
                let result = self.items.enqueue(item);
                let _ = resp.send(result);
            }
            Command::Start => self.start().await,
            Command::Pause => self.pause(),
            Command::Reset => self.reset(),
            Command::Skip => self.skip().await,
            Command::SeekToRatio(r) => self.seek_to_ratio(r),
            Command::RecalculateRunningTimer => self.recalculate_running_timer(),
            Command::UpdateDelayParams(params) => self.delay_params = params,
            Command::Snapshot(resp) => {
                let _ = resp.send(self.snapshot());
            }
            Command::Shutdown(done) => {
                let _ = done.send(());
                return true;
            }
        }
        false
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            run_state: self.run_state,
            queued: self.items.size(),
            finished: self.items.finished(),
            remaining_on_pause_ms: self.remaining_on_pause_ms,
            last_delay_sample: self.last_delay_sample,
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn start(&mut self) {
        match self.run_state {
            RunState::Idle | RunState::Finished if !self.items.is_empty() => {
                self.run_state = RunState::Running;
                self.dispatch_and_advance(true).await;
            }
            RunState::Paused => {
                self.deadline = Some(Instant::now() + Duration::from_millis(self.remaining_on_pause_ms));
                self.remaining_on_pause_ms = 0;
                self.run_state = RunState::Waiting;
            }
            _ => {}
        }
    }

    fn pause(&mut self) {
        if self.run_state == RunState::Waiting {
            if let Some(deadline) = self.deadline {
                let now = Instant::now();
                let remaining = if deadline > now { deadline - now } else { Duration::ZERO };
                self.remaining_on_pause_ms = remaining.as_millis() as u64;
            }
            self.deadline = None;
            self.run_state = RunState::Paused;
        }
    }

    fn reset(&mut self) {
        self.deadline = None;
        self.items.clear();
        self.remaining_on_pause_ms = 0;
        self.last_delay_sample = None;
        self.run_state = RunState::Idle;
    }

    async fn skip(&mut self) {
        match self.run_state {
            RunState::Waiting | RunState::Running => {
                self.deadline = None;
                self.dispatch_and_advance(true).await;
            }
            RunState::Paused => {
                if !self.items.is_empty() {
                    let becomes_empty = self.items.size() == 1;
                    self.dispatch_and_advance(becomes_empty).await;
                }
            }
            RunState::Idle | RunState::Finished => {}
        }
    }

    fn seek_to_ratio(&mut self, r: f64) {
        let r = r.clamp(0.0, 1.0);
        let Some(sample) = self.last_delay_sample else { return };
        let remaining_ms = ((1.0 - r) * sample.total_ms as f64)
            .round()
            .clamp(0.0, sample.total_ms as f64) as u64;
        match self.run_state {
            RunState::Waiting => {
                self.deadline = Some(Instant::now() + Duration::from_millis(remaining_ms));
            }
            RunState::Paused => {
                self.remaining_on_pause_ms = remaining_ms;
            }
            _ => {}
        }
    }

    fn recalculate_running_timer(&mut self) {
        if self.run_state == RunState::Waiting {
            let sample = sample_delay(self.delay_params);
            self.deadline = Some(Instant::now() + Duration::from_millis(sample.total_ms));
            self.last_delay_sample = Some(sample);
        }
    }

    /// Dispatch the current head item. `resume_after` controls whether,
    /// if items remain afterward, a fresh timer is armed and the run state
    /// advances to `Waiting` (the normal flow) or left untouched (a skip
    /// issued while paused, which dispatches one item without resuming
    /// automatic playback).
    async fn dispatch_and_advance(&mut self, resume_after: bool) {
        let Some(item) = self.items.shift() else { return };
        log::debug!(
            "dispatching queue item {}: '{}'",
            item.queue_id,
            crate::logutil::escape_log(&item.text)
        );

        self.automation.auto_scroll().await;
        self.automation.beep_before_send().await;
        self.automation.speak_before_send().await;

        let outcome = self.adapter.send(&item.text, true).await;
        match outcome {
            DispatchOutcome::NotFound | DispatchOutcome::Blocked => {
                self.run_state = RunState::Idle;
                self.deadline = None;
                self.emit(SchedulerEvent::Toast(format!(
                    "could not dispatch: {outcome:?}"
                )));
                return;
            }
            DispatchOutcome::Sent | DispatchOutcome::Manual => {}
        }

        self.emit(SchedulerEvent::Dispatched {
            queue_id: item.queue_id,
            text: item.text.clone(),
        });

        if self.items.is_empty() {
            self.items.set_finished(true);
            self.run_state = RunState::Finished;
            self.deadline = None;
            self.automation.beep_on_finish().await;
            self.emit(SchedulerEvent::Finished);
        } else if resume_after {
            let sample = sample_delay(self.delay_params);
            self.deadline = Some(Instant::now() + Duration::from_millis(sample.total_ms));
            self.last_delay_sample = Some(sample);
            self.run_state = RunState::Waiting;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::automation::NoopAutomation;
    use std::sync::Mutex;

    struct RecordingAdapter {
        calls: Mutex<Vec<(String, bool)>>,
        outcome: DispatchOutcome,
    }

    impl RecordingAdapter {
        fn new(outcome: DispatchOutcome) -> Self {
            RecordingAdapter {
                calls: Mutex::new(Vec::new()),
                outcome,
            }
        }
    }

    #[async_trait::async_trait]
    impl SiteAdapter for RecordingAdapter {
        async fn send(&self, text: &str, auto_send: bool) -> DispatchOutcome {
            self.calls.lock().unwrap().push((text.to_string(), auto_send));
            self.outcome
        }
    }

    fn no_jitter(base_ms: u64) -> DelayParams {
        DelayParams {
            base_ms,
            randomize_enabled: false,
            randomize_percent: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_and_dispatch_one() {
        let adapter = Arc::new(RecordingAdapter::new(DispatchOutcome::Sent));
        let (handle, mut events) = start_scheduler(no_jitter(10_000), adapter.clone(), Arc::new(NoopAutomation));

        handle
            .enqueue(QueueItem::new("✨", "hello", true))
            .await
            .unwrap();
        handle.start();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, SchedulerEvent::Dispatched { .. }));
        let finished = events.recv().await.unwrap();
        assert!(matches!(finished, SchedulerEvent::Finished));

        assert_eq!(adapter.calls.lock().unwrap().as_slice(), &[("hello".to_string(), true)]);

        let snap = handle.snapshot().await.unwrap();
        assert!(snap.finished);
        assert_eq!(snap.run_state, RunState::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_resume_timing() {
        let adapter = Arc::new(RecordingAdapter::new(DispatchOutcome::Sent));
        let (handle, _events) = start_scheduler(no_jitter(20_000), adapter, Arc::new(NoopAutomation));

        handle.enqueue(QueueItem::new("a", "A", true)).await.unwrap();
        handle.enqueue(QueueItem::new("b", "B", true)).await.unwrap();
        handle.start();

        tokio::time::advance(Duration::from_millis(8_000)).await;
        tokio::task::yield_now().await;
        handle.pause();
        tokio::task::yield_now().await;

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.run_state, RunState::Paused);
        assert!((11_800..=12_200).contains(&snap.remaining_on_pause_ms));
    }

    #[tokio::test(start_paused = true)]
    async fn skip_bypasses_wait() {
        let adapter = Arc::new(RecordingAdapter::new(DispatchOutcome::Sent));
        let (handle, mut events) = start_scheduler(no_jitter(60_000), adapter.clone(), Arc::new(NoopAutomation));

        handle.enqueue(QueueItem::new("a", "A", true)).await.unwrap();
        handle.enqueue(QueueItem::new("b", "B", true)).await.unwrap();
        handle.start();
        handle.skip();

        // two dispatches, then finished, with no real time elapsed
        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        let finished = events.recv().await.unwrap();
        assert!(matches!(first, SchedulerEvent::Dispatched { .. }));
        assert!(matches!(second, SchedulerEvent::Dispatched { .. }));
        assert!(matches!(finished, SchedulerEvent::Finished));

        let calls = adapter.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("A".to_string(), true), ("B".to_string(), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn adapter_not_found_stops_queue() {
        let adapter = Arc::new(RecordingAdapter::new(DispatchOutcome::NotFound));
        let (handle, mut events) = start_scheduler(no_jitter(1_000), adapter, Arc::new(NoopAutomation));

        handle.enqueue(QueueItem::new("a", "A", true)).await.unwrap();
        handle.enqueue(QueueItem::new("b", "B", true)).await.unwrap();
        handle.start();

        let toast = events.recv().await.unwrap();
        assert!(matches!(toast, SchedulerEvent::Toast(_)));

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.run_state, RunState::Idle);
        assert_eq!(snap.queued, 1, "item B must remain queued, not re-queued or dropped");
    }

    #[test]
    fn randomized_delay_stays_within_bound() {
        let params = DelayParams {
            base_ms: 60_000,
            randomize_enabled: true,
            randomize_percent: 10,
        };
        let max_offset = (params.base_ms as f64 * params.randomize_percent as f64 / 100.0).round() as i64;
        for _ in 0..10_000 {
            let sample = sample_delay(params);
            assert!(sample.offset_ms.unsigned_abs() as i64 <= max_offset);
            assert!(sample.total_ms <= params.base_ms + max_offset as u64);
        }
    }
}
