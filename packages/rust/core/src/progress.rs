//! Progress callbacks shared by every pipeline.

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each item (file, page, component) is handled.
    fn item_done(&self, name: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_done(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _summary: &str) {}
}
