// UI layer: the `clap` command line, terminal progress via `indicatif` and
// a `dialoguer` confirmation before bulk uploads. Everything here turns
// flags, environment and config files into the explicit structs the
// orchestrator takes, then maps the result to an exit code.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::api::ApiClient;
use crate::config::{resolve_api_key, ConnectionConfig, FileConfig, Target};
use crate::dataset::{Asset, AssetMatcher, DatasetLayout, Split, SplitName, UploadMetadata};
use crate::error::ExitCode;
use crate::events::{RunEvent, RunObserver};
use crate::orchestrator::{upload_single, DatasetOrchestrator, RunOptions};
use crate::report::Reporter;
use crate::uploader::{RetryPolicy, DEFAULT_RETRIES};

const DEFAULT_DATA_DIR: &str = "data";

/// Upload a local image dataset, with optional YOLO labels, to a remote
/// dataset project.
#[derive(Parser, Debug)]
#[command(name = "dataset-sync-cli")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a single image
    Upload(UploadArgs),
    /// Upload every split under a dataset directory
    Sync(SyncArgs),
}

/// Flags shared by both modes.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Workspace id/slug
    #[arg(short, long, env = "ROBOFLOW_WORKSPACE")]
    pub workspace: Option<String>,

    /// Project id/slug inside the workspace
    #[arg(short, long, env = "ROBOFLOW_PROJECT")]
    pub project: Option<String>,

    /// Base URL of the API
    #[arg(long, env = "ROBOFLOW_API_URL")]
    pub api_url: Option<String>,

    /// Batch name used to group the uploads
    #[arg(short, long)]
    pub batch_name: Option<String>,

    /// Tags added to every uploaded image
    #[arg(short, long, num_args = 0..)]
    pub tags: Vec<String>,

    /// Retries after a failed upload attempt [default: 3]
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Position in a sequence, to keep image order
    #[arg(long = "seq-num")]
    pub sequence_number: Option<u32>,

    /// Total size of the sequence
    #[arg(long = "seq-size")]
    pub sequence_size: Option<u32>,

    /// Give up immediately on errors retrying cannot fix (bad key, unreadable file)
    #[arg(long)]
    pub fail_fast: bool,
}

impl CommonArgs {
    /// CLI and environment win over the config file.
    fn connection(&self, api_key: Option<String>, file: &FileConfig) -> ConnectionConfig {
        ConnectionConfig {
            api_key,
            workspace: self.workspace.clone().or_else(|| file.workspace.clone()),
            project: self.project.clone().or_else(|| file.project.clone()),
            api_url: self.api_url.clone().or_else(|| file.api_url.clone()),
        }
    }

    fn run_options(&self, file: &FileConfig, workers: usize) -> RunOptions {
        RunOptions {
            retry: RetryPolicy {
                retries: self.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES),
                fail_fast: self.fail_fast,
                ..RetryPolicy::default()
            },
            metadata: UploadMetadata {
                batch_name: self.batch_name.clone(),
                tags: self.tags.clone(),
                sequence_number: self.sequence_number,
                sequence_size: self.sequence_size,
            },
            workers,
        }
    }
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Image to upload
    #[arg(short, long)]
    pub image: PathBuf,

    /// YOLO label file to attach
    #[arg(long)]
    pub annotation: Option<PathBuf>,

    /// Dataset split for the image
    #[arg(short, long, value_enum)]
    pub split: Option<SplitName>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Dataset root holding train/, val/ and test/ [default: data]
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Only upload this split
    #[arg(short, long, value_enum)]
    pub split: Option<SplitName>,

    /// Upload images only, ignoring label files
    #[arg(long)]
    pub no_labels: bool,

    /// Parallel uploads per split [default: 1]
    #[arg(long)]
    pub workers: Option<usize>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Run the parsed command and return the process exit code.
pub fn run(cli: Cli) -> ExitCode {
    let file = match FileConfig::load() {
        Ok(file) => file,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return ExitCode::Configuration;
        }
    };
    let api_key = resolve_api_key(|name| std::env::var(name).ok());

    match cli.command {
        Command::Upload(args) => run_upload(&args, api_key, &file),
        Command::Sync(args) => match run_sync(&args, api_key, &file) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("ERROR: {e:#}");
                ExitCode::Error
            }
        },
    }
}

fn run_upload(args: &UploadArgs, api_key: Option<String>, file: &FileConfig) -> ExitCode {
    let connection = args.common.connection(api_key, file);
    let options = args.common.run_options(file, 1);
    let asset = Asset {
        image_path: args.image.clone(),
        annotation_path: args.annotation.clone(),
        split: args.split,
    };

    let spinner = ProgressBar::new_spinner();
    let connect = |target: &Target| {
        print_upload_header(target, args);
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("Uploading...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        ApiClient::connect(target)
    };

    let result = upload_single(&connection, asset, &options, connect);
    spinner.finish_and_clear();

    match result {
        Ok(outcome) if outcome.is_uploaded() => {
            println!("\n✅ Upload completed.");
            if let Some(receipt) = &outcome.receipt {
                if let Some(id) = &receipt.id {
                    println!("Image id: {id}");
                }
                if let Some(link) = &receipt.link {
                    println!("Image URL: {link}");
                }
                if receipt.duplicate {
                    println!("(the service already had this image)");
                }
            }
            ExitCode::Success
        }
        Ok(outcome) => {
            eprintln!(
                "\n❌ Upload failed after {} attempts: {}",
                outcome.attempts,
                outcome.last_error.as_deref().unwrap_or("unknown error")
            );
            ExitCode::UploadFailure
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            e.exit_code()
        }
    }
}

fn print_upload_header(target: &Target, args: &UploadArgs) {
    let common = &args.common;
    println!("=== Uploading image ===");
    println!("- Workspace: {}", target.workspace);
    println!("- Project:   {}", target.project);
    println!("- Image:     {}", args.image.display());
    if let Some(annotation) = &args.annotation {
        println!("- Label:     {}", annotation.display());
    }
    if let Some(batch) = &common.batch_name {
        println!("- Batch:     {batch}");
    }
    if let Some(split) = args.split {
        println!("- Split:     {split}");
    }
    if !common.tags.is_empty() {
        println!("- Tags:      {}", common.tags.join(", "));
    }
    if let Some(n) = common.sequence_number {
        let size = common
            .sequence_size
            .map_or_else(|| "?".to_string(), |s| s.to_string());
        println!("- Sequence:  {n}/{size}");
    }
}

fn run_sync(args: &SyncArgs, api_key: Option<String>, file: &FileConfig) -> Result<ExitCode> {
    let connection = args.common.connection(api_key, file);
    let workers = args.workers.or(file.workers).unwrap_or(1);
    let options = args.common.run_options(file, workers);

    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| file.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let mut layout = DatasetLayout::new(&data_dir);
    if args.no_labels {
        layout = layout.without_labels();
    }
    let orchestrator = DatasetOrchestrator::new(layout.splits(args.split), options);

    // Validate before counting so a bad setup never walks the dataset.
    let target = match connection.validate() {
        Ok(target) => target,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return Ok(ExitCode::Configuration);
        }
    };

    let total = count_images(orchestrator.splits());
    let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
    if interactive && !args.yes && !confirm_sync(&target, &data_dir, total)? {
        println!("Aborted.");
        return Ok(ExitCode::Success);
    }

    let observer = ConsoleObserver {
        reporter: Reporter::new(std::io::stdout()).with_color(std::io::stdout().is_terminal()),
        progress: ProgressBar::new(total as u64),
    };
    observer.progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let result = orchestrator.run(&connection, ApiClient::connect, &observer);
    observer.progress.finish_and_clear();

    match result {
        Ok(report) => {
            observer.reporter.write_summary(&report);
            Ok(if report.has_failures() {
                ExitCode::UploadFailure
            } else {
                ExitCode::Success
            })
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            Ok(e.exit_code())
        }
    }
}

fn count_images(splits: &[Split]) -> usize {
    splits
        .iter()
        .filter_map(|split| AssetMatcher::assets(split).ok())
        .map(|assets| assets.len())
        .sum()
}

fn confirm_sync(target: &Target, data_dir: &std::path::Path, total: usize) -> Result<bool> {
    debug!(total, "asking for confirmation");
    Confirm::new()
        .with_prompt(format!(
            "Upload {total} images from {} to {}/{}?",
            data_dir.display(),
            target.workspace,
            target.project
        ))
        .default(true)
        .interact()
        .context("Failed to read confirmation")
}

/// Prints report lines above the progress bar as events arrive.
struct ConsoleObserver {
    reporter: Reporter<std::io::Stdout>,
    progress: ProgressBar,
}

impl RunObserver for ConsoleObserver {
    fn on_event(&self, event: &RunEvent<'_>) {
        self.progress.suspend(|| self.reporter.on_event(event));
        match event {
            RunEvent::AssetFinished(_) => self.progress.inc(1),
            RunEvent::SplitStarted { split, .. } => self.progress.set_message(split.to_string()),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload_flags() {
        let cli = Cli::try_parse_from([
            "dataset-sync-cli",
            "upload",
            "-i",
            "a.jpg",
            "-w",
            "team",
            "-p",
            "smoke",
            "-s",
            "valid",
            "-t",
            "night",
            "street",
            "--seq-num",
            "2",
            "--seq-size",
            "9",
        ])
        .unwrap();

        let Command::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.image, PathBuf::from("a.jpg"));
        assert_eq!(args.split, Some(SplitName::Valid));
        assert_eq!(args.common.tags, vec!["night", "street"]);
        assert_eq!(args.common.sequence_number, Some(2));
        assert_eq!(args.common.retries, None);
    }

    #[test]
    fn rejects_unknown_split() {
        let err = Cli::try_parse_from(["dataset-sync-cli", "sync", "--split", "val"]);
        assert!(err.is_err());
    }

    #[test]
    fn flags_override_file_config() {
        let cli = Cli::try_parse_from([
            "dataset-sync-cli",
            "sync",
            "--project",
            "from-flag",
            "--retries",
            "1",
        ])
        .unwrap();
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        let file = FileConfig {
            workspace: Some("from-file".into()),
            project: Some("file-project".into()),
            retries: Some(7),
            ..FileConfig::default()
        };

        let connection = args.common.connection(Some("key".into()), &file);
        let target = connection.validate().unwrap();
        assert_eq!(target.project, "from-flag");

        let options = args.common.run_options(&file, 3);
        assert_eq!(options.retry.retries, 1);
        assert_eq!(options.workers, 3);
    }

    #[test]
    fn retries_default_to_three() {
        let cli = Cli::try_parse_from(["dataset-sync-cli", "sync"]).unwrap();
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        let options = args.common.run_options(&FileConfig::default(), 1);
        assert_eq!(options.retry.retries, DEFAULT_RETRIES);
        assert!(!options.retry.fail_fast);
    }
}
