//! Off-main-thread estimation, with a synchronous fallback for hosts whose
//! content security policy won't allow a worker boundary at all.
//!
//! In a browser extension this is a literal Web Worker message round-trip;
//! here the "worker boundary" is modeled as a `spawn_blocking` task, and
//! whether that boundary is crossed at all is a capability query on the
//! host rather than a build-time choice, matching spec.md §4.8 and §9.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::token::registry::TokenModelRegistry;

/// The three text snapshots an estimation tick samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimatorTexts {
    pub all: String,
    pub thread_only: String,
    pub editors_only: String,
}

/// One request to the worker boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorInput {
    pub texts: EstimatorTexts,
    pub scale: f64,
    pub counting_method: String,
}

/// Matching estimates for each of the three text snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EstimatorEstimates {
    pub all: u64,
    pub thread_only: u64,
    pub editors_only: u64,
}

/// The worker boundary's response. `ok: false` carries `error` instead of
/// `estimates`; this never happens today (estimation can't fail once a
/// model is resolved) but the shape matches the wire contract in spec.md
/// §4.8, which a host's own worker implementation might still produce an
/// `ok: false` for (e.g. message deserialization failure) even though this
/// in-process port cannot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorOutput {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimates: Option<EstimatorEstimates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EstimatorOutput {
    fn ok(estimates: EstimatorEstimates, model_used: String) -> Self {
        EstimatorOutput {
            ok: true,
            estimates: Some(estimates),
            model_used: Some(model_used),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        EstimatorOutput {
            ok: false,
            estimates: None,
            model_used: None,
            error: Some(message.into()),
        }
    }
}

/// A capability query standing in for "can this page spin up a worker under
/// its CSP". Implementations must be cheap; the worker calls this on every
/// request rather than caching the answer, since a host's CSP can't change
/// mid-session but a test may want to flip it.
pub trait CspPolicy: Send + Sync {
    fn worker_allowed(&self) -> bool;
}

/// The common case: no CSP restriction, every estimate runs off the UI thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnrestrictedCsp;

impl CspPolicy for UnrestrictedCsp {
    fn worker_allowed(&self) -> bool {
        true
    }
}

/// A host whose CSP forbids worker creation; every estimate runs on the
/// calling task instead. No user-visible error results — spec.md classifies
/// this as `worker-unavailable`, silently falling back.
#[derive(Debug, Default, Clone, Copy)]
pub struct RestrictiveCsp;

impl CspPolicy for RestrictiveCsp {
    fn worker_allowed(&self) -> bool {
        false
    }
}

/// Holds the self-contained model set and answers `EstimatorInput` requests,
/// either off-thread (the common path) or synchronously (CSP fallback).
pub struct EstimatorWorker {
    registry: Arc<TokenModelRegistry>,
    csp: Arc<dyn CspPolicy>,
}

impl EstimatorWorker {
    pub fn new(registry: Arc<TokenModelRegistry>, csp: Arc<dyn CspPolicy>) -> Self {
        EstimatorWorker { registry, csp }
    }

    /// A worker over the built-in model set with no CSP restriction — the
    /// configuration a host with a normal CSP gets.
    pub fn with_builtin_models() -> Self {
        EstimatorWorker::new(Arc::new(TokenModelRegistry::with_builtin_models()), Arc::new(UnrestrictedCsp))
    }

    pub fn is_worker_available(&self) -> bool {
        self.csp.worker_allowed()
    }

    /// Estimate all three text snapshots against the model named by
    /// `input.counting_method` (resolved via the registry, falling back to
    /// the default on an unknown id). Runs off-thread when the host's CSP
    /// allows it; otherwise runs synchronously on the caller's task.
    pub async fn estimate(&self, input: EstimatorInput) -> EstimatorOutput {
        if self.csp.worker_allowed() {
            let registry = self.registry.clone();
            match tokio::task::spawn_blocking(move || compute(&registry, &input)).await {
                Ok(output) => output,
                Err(join_err) => EstimatorOutput::err(format!("worker task failed: {join_err}")),
            }
        } else {
            compute(&self.registry, &input)
        }
    }
}

fn compute(registry: &TokenModelRegistry, input: &EstimatorInput) -> EstimatorOutput {
    let model_id = registry.resolve_model_id(&input.counting_method);
    let model = registry
        .get_model(&model_id)
        .unwrap_or_else(|| registry.get_default_model());

    let estimates = EstimatorEstimates {
        all: model.estimate(&input.texts.all, input.scale),
        thread_only: model.estimate(&input.texts.thread_only, input.scale),
        editors_only: model.estimate(&input.texts.editors_only, input.scale),
    };
    EstimatorOutput::ok(estimates, model_id)
}
