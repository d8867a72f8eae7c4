//! The Token Approximator subsystem: a visibility-gated background
//! estimator feeding a thread/editor chip pair off a worker boundary.
//!
//! - [`registry`] - the finite set of token-estimation heuristics (`TokenModelRegistry`)
//! - [`worker`] - the off-main-thread (or synchronous-fallback) estimation boundary
//! - [`approximator`] - the dual cooldown-debounced schedulers driving the chip UI

pub mod approximator;
pub mod registry;
pub mod worker;

pub use approximator::{ChipEvent, ChipKind, ChipStatus, CooldownScheduler, DomTextSource, TokenApproximator};
pub use registry::TokenModelRegistry;
pub use worker::{EstimatorInput, EstimatorOutput, EstimatorTexts, EstimatorWorker};
