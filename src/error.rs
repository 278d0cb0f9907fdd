// Error taxonomy for the sync tool.
//
// Configuration and setup errors are fatal and map to a process exit code.
// Upload errors are recovered by the retrying uploader and only ever end up
// as text on a failed outcome.

use std::path::PathBuf;

use thiserror::Error;

/// Required run-level configuration is missing or unreadable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no API key found; set ROBOFLOW_API_KEY (or roboflow_api_key) in the environment or .env")]
    MissingCredential,

    #[error("no workspace given; pass --workspace or set ROBOFLOW_WORKSPACE")]
    MissingWorkspace,

    #[error("no project given; pass --project or set ROBOFLOW_PROJECT")]
    MissingProject,

    #[error("invalid config file {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },
}

/// The remote service could not be reached or the target does not exist.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("could not initialize the API client: {0}")]
    ClientInit(String),

    #[error("workspace '{workspace}' not found: {reason}")]
    WorkspaceNotFound { workspace: String, reason: String },

    #[error("project '{project}' not found in workspace '{workspace}': {reason}")]
    ProjectNotFound {
        workspace: String,
        project: String,
        reason: String,
    },
}

/// A single upload attempt failed.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected upload: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// Whether retrying this error cannot possibly help (bad credentials,
    /// forbidden project, unreadable local file).
    pub fn is_permanent(&self) -> bool {
        match self {
            UploadError::Io { .. } => true,
            UploadError::Rejected { status, .. } => matches!(status, 401 | 403),
            UploadError::Transport(_) | UploadError::InvalidResponse(_) => false,
        }
    }
}

/// Fatal errors that stop a run before any upload happens.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("file not found: {}", .0.display())]
    AssetNotFound(PathBuf),

    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl RunError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RunError::Config(_) => ExitCode::Configuration,
            RunError::AssetNotFound(_) => ExitCode::FileNotFound,
            RunError::Setup(SetupError::ClientInit(_)) => ExitCode::ClientInit,
            RunError::Setup(SetupError::WorkspaceNotFound { .. }) => ExitCode::WorkspaceNotFound,
            RunError::Setup(SetupError::ProjectNotFound { .. }) => ExitCode::ProjectNotFound,
        }
    }
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Configuration = 2,
    FileNotFound = 3,
    ClientInit = 4,
    WorkspaceNotFound = 5,
    ProjectNotFound = 6,
    UploadFailure = 7,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
