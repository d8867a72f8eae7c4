//! # queue-engine
//!
//! The Prompt Queue & Dispatch Engine: a per-page scheduler that accepts
//! user-authored prompts, serializes them through a configurable delay with
//! random jitter, runs pre-dispatch automation (scroll, beep, speak, finish
//! tone), and invokes a site-specific adapter to inject text and press send.
//! It exposes resumable progress with seek, skip, pause, reorder, and reset.
//!
//! Bundled with the engine, since both are schedulers sharing the same
//! cancellation/visibility contract:
//!
//! - the **Token Approximator** (`token`): a visibility-gated background
//!   estimator feeding a thread/editor chip pair off a worker boundary with
//!   dual cooldown-debounced schedulers.
//! - the **Configuration & Profile Store** (`config`): the persistence,
//!   broadcast, and active-profile invariants the engine relies on.
//!
//! DOM selectors, text-insertion, popup UI, tooltips, drag choreography,
//! theming, and the welcome page are out of scope for this crate; they are
//! represented only as trait boundaries (`site::SiteAdapter`,
//! `queue::automation::QueueAutomation`) that a host implements.
//!
//! ## Module organization
//!
//! - [`config`] - `Profile`/`GlobalSettings` types and the `ConfigStore` persistence layer
//! - [`broadcast`] - inter-tab `profileChanged` fanout
//! - [`site`] - per-site adapter contract and the finite site registry
//! - [`queue`] - `QueueModel`, `SchedulerHandle`, `QueueAutomation`
//! - [`token`] - `TokenModelRegistry`, `EstimatorWorker`, `TokenApproximator`
//! - [`messages`] - the request/response contract shared across tab and popup boundaries
//! - [`dispatch`] - wires `messages` requests onto `ConfigStore` and host capabilities
//! - [`errors`] - the engine's error taxonomy
//! - [`logutil`] - single-line-safe logging of user-authored prompt text
//! - [`validation`] - storage-key sanitization and guarded JSON parsing

pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod logutil;
pub mod messages;
pub mod queue;
pub mod site;
pub mod token;
pub mod validation;
