//! Progress reporting for jurisdiction runs.
//!
//! The orchestrator reports per-document progress through
//! [`ProgressCallback`] so it does not depend on a rendering backend. The
//! CLI renders it with `indicatif`; tests and library callers use
//! [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a run.
///
/// Implementations must be `Send + Sync` so one reporter can be shared
/// across runs behind an `Arc`.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of documents the run will process.
    fn set_total(&self, total: u64);

    /// Advances by `delta` documents.
    fn inc(&self, delta: u64);

    /// Updates the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the run complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
