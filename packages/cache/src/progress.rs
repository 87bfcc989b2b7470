//! Progress reporting for downloads and batch runs.
//!
//! The cache and pipeline crates only see [`ProgressCallback`]; the
//! `indicatif` bars behind it live in the CLI utilities crate.

use std::sync::Arc;

/// Sink for progress of one long-running unit of work.
pub trait ProgressCallback: Send + Sync {
    /// Number of units expected (bytes for a download, boundaries for a
    /// batch).
    fn set_total(&self, total: u64);

    /// Records `delta` more completed units.
    fn inc(&self, delta: u64);

    /// Replaces the text shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Leaves the indicator on screen with a closing message.
    fn finish(&self, msg: String);

    /// Removes the indicator.
    fn finish_and_clear(&self);
}

/// Creates a fresh progress indicator for one download, labelled with the
/// URL being fetched.
pub type ProgressFactory = Arc<dyn Fn(&str) -> Arc<dyn ProgressCallback> + Send + Sync>;

/// Reports nothing.
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

/// Returns a [`ProgressFactory`] that always hands out [`NullProgress`].
#[must_use]
pub fn null_progress_factory() -> ProgressFactory {
    Arc::new(|_label: &str| null_progress())
}
