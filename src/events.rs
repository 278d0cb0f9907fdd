// Progress events emitted while a run is in flight.

use crate::dataset::{SplitMissing, SplitName};
use crate::report::SplitSummary;
use crate::uploader::UploadOutcome;

/// Events emitted during a run, in processing order per split.
#[derive(Debug, Clone, Copy)]
pub enum RunEvent<'a> {
    /// A split's images were enumerated and uploads are about to start.
    SplitStarted { split: SplitName, assets: usize },
    /// The split's image directory does not exist; it is skipped.
    SplitMissing(&'a SplitMissing),
    /// One asset reached its final outcome.
    AssetFinished(&'a UploadOutcome),
    /// Every asset of the split has an outcome.
    SplitFinished(&'a SplitSummary),
}

/// Receives run events. Called from worker threads when uploads run in
/// parallel.
pub trait RunObserver: Send + Sync {
    fn on_event(&self, event: &RunEvent<'_>);
}

impl<F> RunObserver for F
where
    F: Fn(&RunEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent<'_>) {
        self(event)
    }
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn on_event(&self, _event: &RunEvent<'_>) {}
}
