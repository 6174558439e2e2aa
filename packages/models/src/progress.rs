//! Progress reporting for long-running pipeline stages.
//!
//! Stages (column projection, the month-by-month insert, pack generation)
//! report through [`ProgressCallback`] so they stay independent of the
//! terminal renderer chosen by the binary.

use std::sync::Arc;

/// Receives progress updates from a running stage.
///
/// Implementations must be `Send + Sync` so a single reporter can be
/// shared between the main pipeline and spawned tasks.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the stage complete, leaving a final message.
    fn finish(&self, msg: String);

    /// Marks the stage complete and removes the indicator.
    fn finish_and_clear(&self);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
