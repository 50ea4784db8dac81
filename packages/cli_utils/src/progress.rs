//! Progress reporting for batch runs.
//!
//! Pipeline code reports through [`ProgressCallback`] and never touches a
//! terminal. The CLI passes an [`IndicatifProgress`](crate::IndicatifProgress);
//! tests and library callers pass [`null_progress`].

use std::sync::Arc;

/// Sink for progress updates from a long-running batch.
///
/// Must be `Send + Sync` so one handle can be shared with worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of units the batch will process.
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the status text.
    fn set_message(&self, msg: String);

    /// Marks the batch done, leaving `msg` on screen.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
