// Split runner: matches a split's assets and pushes each through the
// retrying uploader. One failed asset never stops the rest of the split.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::api::RemoteClient;
use crate::dataset::{
    Asset, AssetMatcher, Split, SplitAssets, SplitMissing, SplitName, UploadMetadata,
};
use crate::events::{RunEvent, RunObserver};
use crate::uploader::{RetryingUploader, UploadOutcome};

/// Result of running one split.
#[derive(Debug)]
pub enum SplitRun {
    Missing(SplitMissing),
    Completed {
        split: SplitName,
        outcomes: Vec<UploadOutcome>,
    },
}

pub struct SplitRunner<'a, C: ?Sized> {
    uploader: RetryingUploader<'a, C>,
    metadata: &'a UploadMetadata,
    workers: usize,
}

impl<'a, C: RemoteClient + ?Sized> SplitRunner<'a, C> {
    /// `workers <= 1` uploads sequentially.
    pub fn new(
        uploader: RetryingUploader<'a, C>,
        metadata: &'a UploadMetadata,
        workers: usize,
    ) -> Self {
        SplitRunner {
            uploader,
            metadata,
            workers,
        }
    }

    /// Lazy, sequential outcomes for the split: one upload per `next()`.
    pub fn outcomes<'r>(
        &'r self,
        split: &Split,
    ) -> Result<SplitOutcomes<'r, 'a, C>, SplitMissing> {
        let assets = AssetMatcher::assets(split)?;
        Ok(SplitOutcomes {
            runner: self,
            assets,
        })
    }

    /// Run the whole split, notifying `observer` as each asset finishes.
    pub fn run(&self, split: &Split, observer: &dyn RunObserver) -> SplitRun {
        let assets = match AssetMatcher::assets(split) {
            Ok(assets) => assets,
            Err(missing) => {
                warn!(split = %split.name, "{missing}, skipping");
                observer.on_event(&RunEvent::SplitMissing(&missing));
                return SplitRun::Missing(missing);
            }
        };

        info!(split = %split.name, assets = assets.len(), "uploading split");
        observer.on_event(&RunEvent::SplitStarted {
            split: split.name,
            assets: assets.len(),
        });

        let outcomes = if self.workers > 1 && assets.len() > 1 {
            self.run_pooled(assets, observer)
        } else {
            assets
                .map(|asset| self.upload_one(asset, observer))
                .collect()
        };

        SplitRun::Completed {
            split: split.name,
            outcomes,
        }
    }

    /// Upload on a bounded rayon pool. `collect` keeps discovery order and
    /// returns only after every worker is done.
    fn run_pooled(&self, assets: SplitAssets, observer: &dyn RunObserver) -> Vec<UploadOutcome> {
        let assets: Vec<Asset> = assets.collect();
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => pool.install(|| {
                assets
                    .into_par_iter()
                    .map(|asset| self.upload_one(asset, observer))
                    .collect()
            }),
            Err(e) => {
                warn!(
                    "could not start {} upload workers, running sequentially: {e}",
                    self.workers
                );
                assets
                    .into_iter()
                    .map(|asset| self.upload_one(asset, observer))
                    .collect()
            }
        }
    }

    fn upload_one(&self, asset: Asset, observer: &dyn RunObserver) -> UploadOutcome {
        let outcome = self.uploader.upload(asset, self.metadata);
        observer.on_event(&RunEvent::AssetFinished(&outcome));
        outcome
    }
}

/// Iterator returned by [`SplitRunner::outcomes`].
pub struct SplitOutcomes<'r, 'a, C: ?Sized> {
    runner: &'r SplitRunner<'a, C>,
    assets: SplitAssets,
}

impl<C: RemoteClient + ?Sized> Iterator for SplitOutcomes<'_, '_, C> {
    type Item = UploadOutcome;

    fn next(&mut self) -> Option<UploadOutcome> {
        let asset = self.assets.next()?;
        Some(self.runner.uploader.upload(asset, self.runner.metadata))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.assets.size_hint()
    }
}
