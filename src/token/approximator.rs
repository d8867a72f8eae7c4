//! The visibility-gated token approximator: two cooldown-debounced
//! schedulers (thread, editor) driving a pair of chip UIs off the
//! [`EstimatorWorker`] boundary.
//!
//! [`CooldownScheduler`] is the generalized primitive spec.md §4.6 calls for
//! ("the two cooldown-debounced schedulers are generalized into a single
//! primitive" per SPEC_FULL.md) — it knows nothing about tokens or chips,
//! only about debouncing a unit of work behind a minimum cooldown while
//! respecting tab visibility. [`TokenApproximator`] wires two instances of
//! it to the tunables spec.md gives (~15s thread, ~600ms editor) and to the
//! chip formatting/staleness rules.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::config::{ChipPlacement, ThreadMode, TokenApproximatorSettings};
use crate::token::worker::{EstimatorInput, EstimatorTexts, EstimatorWorker};

// ---------------------------------------------------------------------
// CooldownScheduler: a generic debounced-work primitive.
// ---------------------------------------------------------------------

/// `{idle, pendingDirty, scheduled, running}` per spec.md §9's design note
/// for cooldown schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Idle,
    PendingDirty,
    Scheduled,
    Running,
}

/// The unit of work a [`CooldownScheduler`] debounces. Implementations must
/// be fast to invoke (scheduling the real work, not necessarily finishing
/// it) and must never panic.
#[async_trait]
pub trait CooldownWork: Send + Sync {
    async fn run(&self);
}

enum Command {
    MarkDirty,
    RunNow(oneshot::Sender<bool>),
    ForceNow(oneshot::Sender<()>),
    SetVisible(bool),
    State(oneshot::Sender<CooldownState>),
    Shutdown(oneshot::Sender<()>),
}

/// Cheap-to-clone handle to a running cooldown scheduler actor.
#[derive(Clone)]
pub struct CooldownScheduler {
    tx: mpsc::UnboundedSender<Command>,
}

impl CooldownScheduler {
    /// Spawn a scheduler that debounces `work` behind `min_cooldown`,
    /// starting visible (the common case: a host constructs this only once
    /// its page is already showing).
    pub fn spawn(min_cooldown: Duration, work: Arc<dyn CooldownWork>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_actor(rx, min_cooldown, work));
        CooldownScheduler { tx }
    }

    /// Mark dirty: schedules a tick at the first of (immediately, if no
    /// cooldown is outstanding) or (cooldown elapsed). No-op while paused
    /// beyond remembering that work is owed once resumed.
    pub fn mark_dirty(&self) {
        let _ = self.tx.send(Command::MarkDirty);
    }

    /// Run now if the cooldown has elapsed; returns whether it actually ran.
    pub async fn run_now(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::RunNow(tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Bypass the cooldown entirely (used only for a direct chip click).
    pub async fn force_now(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::ForceNow(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn set_visible(&self, visible: bool) {
        let _ = self.tx.send(Command::SetVisible(visible));
    }

    pub async fn state(&self) -> Option<CooldownState> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::State(tx)).is_ok() {
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

struct CooldownActor {
    min_cooldown: Duration,
    dirty: bool,
    visible: bool,
    last_run: Option<Instant>,
    deadline: Option<Instant>,
    state: CooldownState,
    work: Arc<dyn CooldownWork>,
}

async fn run_actor(mut rx: mpsc::UnboundedReceiver<Command>, min_cooldown: Duration, work: Arc<dyn CooldownWork>) {
    let mut actor = CooldownActor {
        min_cooldown,
        dirty: false,
        visible: true,
        last_run: None,
        deadline: None,
        state: CooldownState::Idle,
        work,
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
                actor.fire_if_due().await;
            }
        }
    }
}

impl CooldownActor {
    fn remaining_cooldown(&self) -> Duration {
        match self.last_run {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = Instant::now().saturating_duration_since(last);
                self.min_cooldown.saturating_sub(elapsed)
            }
        }
    }

    fn schedule_if_needed(&mut self) {
        if !self.visible || !self.dirty || self.deadline.is_some() {
            return;
        }
        let remaining = self.remaining_cooldown();
        self.deadline = Some(Instant::now() + remaining);
        self.state = CooldownState::Scheduled;
    }

    async fn fire_if_due(&mut self) {
        if self.visible && self.dirty {
            self.state = CooldownState::Running;
            self.work.run().await;
            self.last_run = Some(Instant::now());
            self.dirty = false;
            self.state = CooldownState::Idle;
        } else {
            self.state = if self.dirty { CooldownState::PendingDirty } else { CooldownState::Idle };
        }
    }

    /// Returns `true` when the actor should shut down.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::MarkDirty => {
                self.dirty = true;
                if self.visible {
                    self.schedule_if_needed();
                } else {
                    self.state = CooldownState::PendingDirty;
                }
            }
            Command::RunNow(resp) => {
                let ran = if self.visible && self.remaining_cooldown() == Duration::ZERO {
                    self.deadline = None;
                    self.state = CooldownState::Running;
                    self.work.run().await;
                    self.last_run = Some(Instant::now());
                    self.dirty = false;
                    self.state = CooldownState::Idle;
                    true
                } else {
                    false
                };
                let _ = resp.send(ran);
            }
            Command::ForceNow(resp) => {
                // Zero the last-run timestamp before scheduling, so the
                // cooldown can never block this call.
                self.last_run = None;
                self.deadline = None;
                self.state = CooldownState::Running;
                self.work.run().await;
                self.last_run = Some(Instant::now());
                self.dirty = false;
                self.state = CooldownState::Idle;
                let _ = resp.send(());
            }
            Command::SetVisible(visible) => {
                self.visible = visible;
                if !visible {
                    self.deadline = None;
                    if self.dirty {
                        self.state = CooldownState::PendingDirty;
                    }
                } else {
                    self.schedule_if_needed();
                }
            }
            Command::State(resp) => {
                let _ = resp.send(self.state);
            }
            Command::Shutdown(done) => {
                let _ = done.send(());
                return true;
            }
        }
        false
    }
}

// ---------------------------------------------------------------------
// Chip formatting (spec.md §4.6 / §6 / §8's testable property).
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipKind {
    Thread,
    Editor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipStatus {
    Loading,
    Fresh,
    Stale,
    Paused,
}

/// Stale timeouts, per spec.md §6/§9 (tunables, fixed here per SPEC_FULL.md's
/// Open-Question resolution).
pub const EDITOR_STALE_MS: u64 = 12_000;
pub const THREAD_STALE_MS: u64 = 6_500;

/// `< ceil(v/100)*100` below 1000, `ceil(v/1000)k` at or above — spec.md
/// §8's chip-value-formatting invariant.
pub fn format_chip_value(v: u64) -> String {
    if v < 1000 {
        let rounded = ((v + 99) / 100) * 100;
        format!("<{rounded}")
    } else {
        let k = (v + 999) / 1000;
        format!("{k}k")
    }
}

pub fn chip_prefix(kind: ChipKind, thread_mode: ThreadMode) -> &'static str {
    match kind {
        ChipKind::Thread => match thread_mode {
            ThreadMode::WithEditors => "Whole-thread tokens (with editors)",
            ThreadMode::IgnoreEditors | ThreadMode::Hide => "Whole-thread tokens (thread only)",
        },
        ChipKind::Editor => "Editor tokens",
    }
}

pub fn chip_status_text(status: ChipStatus) -> &'static str {
    match status {
        ChipStatus::Loading => "calculating…",
        ChipStatus::Fresh => "updated just now",
        ChipStatus::Stale => "stale — click to re-estimate",
        ChipStatus::Paused => "paused while tab inactive",
    }
}

/// `"{prefix} — {status}{cta}"`. The only status whose call-to-action text
/// is not already folded into [`chip_status_text`] is `Fresh`, which gets no
/// cta at all; every other status's copy already names its own action, so
/// `cta` is always empty here (SPEC_FULL.md Open-Question resolution).
pub fn chip_tooltip(kind: ChipKind, thread_mode: ThreadMode, status: ChipStatus) -> String {
    format!("{} — {}", chip_prefix(kind, thread_mode), chip_status_text(status))
}

// ---------------------------------------------------------------------
// TokenApproximator
// ---------------------------------------------------------------------

/// A snapshot of DOM text for the active page, supplied by the host. The
/// approximator re-samples this on every tick rather than caching it, since
/// the underlying DOM nodes may have been recreated between ticks (spec.md
/// §5: "chip DOM elements may be recreated; handlers must re-resolve
/// references inside each callback" applies equally to the text source).
#[async_trait]
pub trait DomTextSource: Send + Sync {
    async fn snapshot(&self) -> EstimatorTexts;
}

/// One chip's current state, broadcast to the host on every transition.
#[derive(Debug, Clone)]
pub struct ChipEvent {
    pub kind: ChipKind,
    pub status: ChipStatus,
    pub value: String,
}

struct ChipSlot {
    status: ChipStatus,
    value: String,
    generation: u64,
}

impl ChipSlot {
    fn new() -> Self {
        ChipSlot {
            status: ChipStatus::Loading,
            value: String::new(),
            generation: 0,
        }
    }
}

struct TickWork {
    kind: ChipKind,
    source: Arc<dyn DomTextSource>,
    worker: Arc<EstimatorWorker>,
    settings: Arc<Mutex<TokenApproximatorSettings>>,
    chip: Arc<Mutex<ChipSlot>>,
    events_tx: broadcast::Sender<ChipEvent>,
    stale_after: Duration,
}

impl TickWork {
    fn emit(&self, status: ChipStatus, value: String) {
        let _ = self.events_tx.send(ChipEvent { kind: self.kind, status, value });
    }
}

#[async_trait]
impl CooldownWork for TickWork {
    async fn run(&self) {
        {
            let mut chip = self.chip.lock().unwrap();
            chip.status = ChipStatus::Loading;
        }
        self.emit(ChipStatus::Loading, String::new());

        let texts = self.source.snapshot().await;
        let (scale, counting_method, thread_mode) = {
            let settings = self.settings.lock().unwrap();
            (settings.scale, settings.counting_method.clone(), settings.thread_mode)
        };

        let output = self
            .worker
            .estimate(EstimatorInput {
                texts,
                scale,
                counting_method,
            })
            .await;

        let value = match output.estimates {
            Some(estimates) => {
                let raw = match self.kind {
                    ChipKind::Editor => estimates.editors_only,
                    ChipKind::Thread if thread_mode == ThreadMode::IgnoreEditors => estimates.thread_only,
                    ChipKind::Thread => estimates.all,
                };
                format_chip_value(raw)
            }
            None => "—".to_string(),
        };

        let generation = {
            let mut chip = self.chip.lock().unwrap();
            chip.status = ChipStatus::Fresh;
            chip.value = value.clone();
            chip.generation += 1;
            chip.generation
        };
        self.emit(ChipStatus::Fresh, value);

        let chip = self.chip.clone();
        let events_tx = self.events_tx.clone();
        let stale_after = self.stale_after;
        let kind = self.kind;
        tokio::spawn(async move {
            tokio::time::sleep(stale_after).await;
            let stale_value = {
                let mut slot = chip.lock().unwrap();
                if slot.generation != generation || slot.status != ChipStatus::Fresh {
                    return;
                }
                slot.status = ChipStatus::Stale;
                slot.value.clone()
            };
            let _ = events_tx.send(ChipEvent {
                kind,
                status: ChipStatus::Stale,
                value: stale_value,
            });
        });
    }
}

/// Drives the thread and editor chips. Disabled entirely (per
/// `TokenApproximatorSettings::enabled`) ignores every notification;
/// enabling it later (via [`TokenApproximator::set_enabled`]) starts fresh.
pub struct TokenApproximator {
    thread_scheduler: CooldownScheduler,
    editor_scheduler: CooldownScheduler,
    enabled: Arc<AtomicBool>,
    visible: Arc<AtomicBool>,
    settings: Arc<Mutex<TokenApproximatorSettings>>,
    safety_tick_generation: Arc<AtomicU64>,
}

const THREAD_MIN_COOLDOWN: Duration = Duration::from_secs(15);
const EDITOR_MIN_COOLDOWN: Duration = Duration::from_millis(600);
const THREAD_SAFETY_TICK: Duration = Duration::from_secs(45);

impl TokenApproximator {
    /// Build an approximator wired to `source` and `worker`, returning it
    /// alongside a broadcast receiver of chip updates. Starts with the
    /// given settings and a 45s periodic safety tick for the thread chip
    /// (so a mutation observer miss can't leave it stale forever).
    pub fn new(
        source: Arc<dyn DomTextSource>,
        worker: Arc<EstimatorWorker>,
        settings: TokenApproximatorSettings,
    ) -> (Self, broadcast::Receiver<ChipEvent>) {
        let (events_tx, events_rx) = broadcast::channel(64);
        let settings = Arc::new(Mutex::new(settings));

        let thread_chip = Arc::new(Mutex::new(ChipSlot::new()));
        let editor_chip = Arc::new(Mutex::new(ChipSlot::new()));

        let thread_work = Arc::new(TickWork {
            kind: ChipKind::Thread,
            source: source.clone(),
            worker: worker.clone(),
            settings: settings.clone(),
            chip: thread_chip,
            events_tx: events_tx.clone(),
            stale_after: Duration::from_millis(THREAD_STALE_MS),
        });
        let editor_work = Arc::new(TickWork {
            kind: ChipKind::Editor,
            source,
            worker,
            settings: settings.clone(),
            chip: editor_chip,
            events_tx: events_tx.clone(),
            stale_after: Duration::from_millis(EDITOR_STALE_MS),
        });

        let thread_scheduler = CooldownScheduler::spawn(THREAD_MIN_COOLDOWN, thread_work);
        let editor_scheduler = CooldownScheduler::spawn(EDITOR_MIN_COOLDOWN, editor_work);

        let enabled = Arc::new(AtomicBool::new(settings.lock().unwrap().enabled));
        let visible = Arc::new(AtomicBool::new(true));
        let safety_tick_generation = Arc::new(AtomicU64::new(0));

        {
            let thread_scheduler = thread_scheduler.clone();
            let enabled = enabled.clone();
            let generation = safety_tick_generation.clone();
            let my_generation = generation.load(Ordering::SeqCst);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(THREAD_SAFETY_TICK);
                interval.tick().await; // consume the immediate first tick
                loop {
                    interval.tick().await;
                    if generation.load(Ordering::SeqCst) != my_generation {
                        break;
                    }
                    if enabled.load(Ordering::SeqCst) {
                        thread_scheduler.mark_dirty();
                    }
                }
            });
        }

        let approximator = TokenApproximator {
            thread_scheduler,
            editor_scheduler,
            enabled,
            visible,
            settings,
            safety_tick_generation,
        };
        (approximator, events_rx)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Replace the active settings (e.g. on `tokenApproximatorSettingsChanged`).
    pub fn update_settings(&self, settings: TokenApproximatorSettings) {
        self.enabled.store(settings.enabled, Ordering::SeqCst);
        *self.settings.lock().unwrap() = settings;
    }

    /// Thread mutation, scroll, or safety-tick activity.
    pub fn notify_thread_activity(&self) {
        if self.is_enabled() {
            self.thread_scheduler.mark_dirty();
        }
    }

    /// An `input` event on an editable element.
    pub fn notify_editor_input(&self) {
        if self.is_enabled() {
            self.editor_scheduler.mark_dirty();
        }
    }

    /// A direct chip click: bypasses cooldown for that chip only.
    pub async fn force_refresh(&self, kind: ChipKind) {
        if !self.is_enabled() {
            return;
        }
        match kind {
            ChipKind::Thread => self.thread_scheduler.force_now().await,
            ChipKind::Editor => self.editor_scheduler.force_now().await,
        }
    }

    /// `document.visibilityState` changed. Pauses both schedulers while
    /// hidden and triggers a catch-up dirty mark on return to visible.
    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
        self.thread_scheduler.set_visible(visible);
        self.editor_scheduler.set_visible(visible);
        if visible && self.is_enabled() {
            self.thread_scheduler.mark_dirty();
            self.editor_scheduler.mark_dirty();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Stop the safety-tick loop and both schedulers. Best-effort; drops
    /// handles either way.
    pub async fn shutdown(&self) {
        self.safety_tick_generation.fetch_add(1, Ordering::SeqCst);
        self.thread_scheduler.shutdown().await;
        self.editor_scheduler.shutdown().await;
    }
}
