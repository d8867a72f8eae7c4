//! Error taxonomy for the prompt queue & dispatch engine.
//!
//! Kinds mirror the failure taxonomy of the engine's error-handling design:
//! storage errors are non-fatal and logged by the caller, dispatch errors stop
//! the running queue, and config errors are normalized away rather than
//! propagated. No variant here is meant to abort the host's event loop; every
//! public entry point that can fail returns a `Result` instead of panicking.

use thiserror::Error;

/// Errors surfaced by the engine's public APIs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The host's storage backend rejected a write because its quota was exceeded.
    #[error("storage quota exceeded: {0}")]
    StorageQuota(String),

    /// A storage read or write failed for a reason other than quota (I/O, corruption).
    #[error("storage io error: {0}")]
    StorageIo(String),

    /// A `SiteAdapter` could not find the text editor or send control for the active site.
    #[error("selector missing for site {site}: {reason}")]
    SelectorMissing { site: String, reason: String },

    /// A `SiteAdapter` found the send control but the site blocked the click (rate limit, disabled state).
    #[error("adapter blocked dispatch: {0}")]
    AdapterBlocked(String),

    /// The estimator worker is unavailable (CSP restriction or channel closed); caller should fall back to the synchronous path.
    #[error("estimator worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// A stored configuration value failed validation; the caller should use `Profile::normalized()` instead of propagating this.
    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    /// A broadcast recipient tab could not be reached; suppressed per-tab by `BroadcastBus`.
    #[error("broadcast tab unreachable: {0}")]
    BroadcastTabUnreachable(String),

    /// The named profile does not exist.
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// The queue has reached `QUEUE_MAX_SIZE` and rejected the enqueue.
    #[error("queue is full (max {max})")]
    QueueFull { max: usize },
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<crate::queue::model::QueueFullError> for EngineError {
    fn from(e: crate::queue::model::QueueFullError) -> Self {
        EngineError::QueueFull { max: e.max }
    }
}
