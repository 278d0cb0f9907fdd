// Library root
// -----------
// This crate exposes the upload engine behind the `dataset-sync-cli`
// binary. The binary (`main.rs`) only parses flags and sets up logging.
//
// Module responsibilities:
// - `dataset`: splits, assets and the image/label matcher.
// - `uploader`: retry state machine and the retrying uploader.
// - `runner`: runs one split, sequentially or on a worker pool.
// - `orchestrator`: validates config, connects, runs every split.
// - `report`: the run report and its text rendering.
// - `api`: the remote-client seam and the HTTP client behind it.
// - `config` / `error`: configuration resolution and error taxonomy.
// - `ui`: command line, prompts and progress output.
pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod ui;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, RemoteClient, UploadReceipt, UploadRequest};
pub use config::{ConnectionConfig, Target};
pub use dataset::{
    Asset, AssetMatcher, DatasetLayout, Split, SplitMissing, SplitName, UploadMetadata,
};
pub use error::{ConfigError, ExitCode, RunError, SetupError, UploadError};
pub use events::{NoopObserver, RunEvent, RunObserver};
pub use orchestrator::{upload_single, DatasetOrchestrator, RunOptions};
pub use report::{Report, Reporter, SplitStatus, SplitSummary};
pub use uploader::{Backoff, OutcomeStatus, RetryPolicy, RetryingUploader, UploadOutcome};
