// Dataset orchestrator: validates the run configuration, connects to the
// remote service and drives the split runner over every configured split.

use tracing::info;

use crate::api::RemoteClient;
use crate::config::{ConnectionConfig, Target};
use crate::dataset::{Asset, Split, UploadMetadata};
use crate::error::{RunError, SetupError};
use crate::events::{RunEvent, RunObserver};
use crate::report::Report;
use crate::runner::{SplitRun, SplitRunner};
use crate::uploader::{RetryPolicy, RetryingUploader, UploadOutcome};

/// Settings shared by every upload of a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub retry: RetryPolicy,
    pub metadata: UploadMetadata,
    /// Parallel uploads per split; 0 or 1 is sequential.
    pub workers: usize,
}

pub struct DatasetOrchestrator {
    splits: Vec<Split>,
    options: RunOptions,
}

impl DatasetOrchestrator {
    pub fn new(splits: Vec<Split>, options: RunOptions) -> Self {
        DatasetOrchestrator { splits, options }
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    /// Validate `config`, connect with `connect`, then upload every split.
    ///
    /// Missing credential, workspace or project fails before the filesystem
    /// or the network is touched.
    pub fn run<C, F>(
        &self,
        config: &ConnectionConfig,
        connect: F,
        observer: &dyn RunObserver,
    ) -> Result<Report, RunError>
    where
        C: RemoteClient,
        F: FnOnce(&Target) -> Result<C, SetupError>,
    {
        let target = config.validate()?;
        let client = connect(&target)?;
        Ok(self.run_with(&client, observer))
    }

    /// Upload every split with an already connected client.
    pub fn run_with<C>(&self, client: &C, observer: &dyn RunObserver) -> Report
    where
        C: RemoteClient + ?Sized,
    {
        let uploader = RetryingUploader::new(client, self.options.retry);
        let runner = SplitRunner::new(uploader, &self.options.metadata, self.options.workers);
        let mut report = Report::new();

        for split in &self.splits {
            match runner.run(split, observer) {
                SplitRun::Missing(missing) => report.push_missing(missing.split),
                SplitRun::Completed { split, outcomes } => {
                    let summary = report.push_split(split, outcomes);
                    info!(
                        split = %summary.split,
                        uploaded = summary.uploaded,
                        failed = summary.failed,
                        "split finished"
                    );
                    observer.on_event(&RunEvent::SplitFinished(summary));
                }
            }
        }

        info!(
            uploaded = report.uploaded(),
            failed = report.failed(),
            "run finished"
        );
        report
    }
}

/// Upload one explicitly named asset (single-asset mode).
///
/// Unlike batch mode, a missing image or annotation file is fatal.
pub fn upload_single<C, F>(
    config: &ConnectionConfig,
    asset: Asset,
    options: &RunOptions,
    connect: F,
) -> Result<UploadOutcome, RunError>
where
    C: RemoteClient,
    F: FnOnce(&Target) -> Result<C, SetupError>,
{
    let target = config.validate()?;

    let missing = std::iter::once(&asset.image_path)
        .chain(asset.annotation_path.as_ref())
        .find(|path| !path.is_file());
    if let Some(path) = missing {
        return Err(RunError::AssetNotFound(path.clone()));
    }

    let client = connect(&target)?;
    let uploader = RetryingUploader::new(&client, options.retry);
    Ok(uploader.upload(asset, &options.metadata))
}
