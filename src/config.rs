// Run configuration: credential lookup, connection target and the optional
// TOML config file.
//
// Everything here is resolved once at startup and handed to the
// orchestrator by reference. Nothing below the CLI layer reads the process
// environment.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;

/// Primary environment variable holding the API key.
pub const API_KEY_VAR: &str = "ROBOFLOW_API_KEY";
/// Lowercase fallback, as written in older `.env` files.
pub const API_KEY_FALLBACK_VAR: &str = "roboflow_api_key";
pub const DEFAULT_API_URL: &str = "https://api.roboflow.com";

const APP_DIR: &str = "dataset-sync";
const PROJECT_FILE: &str = ".dataset-sync.toml";

/// Resolve the API key through `lookup`, trying the primary variable first.
/// Empty values count as unset.
pub fn resolve_api_key<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    [API_KEY_VAR, API_KEY_FALLBACK_VAR]
        .into_iter()
        .filter_map(lookup)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Connection settings as gathered from flags, environment and files.
/// Any field may still be missing; `validate` decides.
#[derive(Clone, Default)]
pub struct ConnectionConfig {
    pub api_key: Option<String>,
    pub workspace: Option<String>,
    pub project: Option<String>,
    pub api_url: Option<String>,
}

impl ConnectionConfig {
    /// Check that credential, workspace and project are all present.
    pub fn validate(&self) -> Result<Target, ConfigError> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let api_key = present(&self.api_key).ok_or(ConfigError::MissingCredential)?;
        let workspace = present(&self.workspace).ok_or(ConfigError::MissingWorkspace)?;
        let project = present(&self.project).ok_or(ConfigError::MissingProject)?;
        let api_url = present(&self.api_url).unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Target {
            api_key,
            workspace,
            project,
            api_url,
        })
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("workspace", &self.workspace)
            .field("project", &self.project)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// A validated remote target.
#[derive(Clone, PartialEq, Eq)]
pub struct Target {
    pub api_key: String,
    pub workspace: String,
    pub project: String,
    pub api_url: String,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("api_key", &"<redacted>")
            .field("workspace", &self.workspace)
            .field("project", &self.project)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Optional settings file. The API key is never read from it.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub workspace: Option<String>,
    pub project: Option<String>,
    pub api_url: Option<String>,
    pub retries: Option<u32>,
    pub workers: Option<usize>,
    pub data_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Load the user config, then the nearest project-local file over it.
    /// Missing files are fine; unreadable or malformed ones are errors.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml")) {
            if path.is_file() {
                info!("Loading user config: {}", path.display());
                config.merge(Self::from_file(&path)?);
            } else {
                debug!("User config not found: {}", path.display());
            }
        }

        if let Some(path) = std::env::current_dir()
            .ok()
            .and_then(|cwd| find_in_parents(&cwd, PROJECT_FILE))
        {
            info!("Loading project config: {}", path.display());
            config.merge(Self::from_file(&path)?);
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        toml::from_str(&content).map_err(|e| invalid(e.to_string()))
    }

    /// Values from `other` win when present.
    pub fn merge(&mut self, other: Self) {
        self.workspace = other.workspace.or_else(|| self.workspace.take());
        self.project = other.project.or_else(|| self.project.take());
        self.api_url = other.api_url.or_else(|| self.api_url.take());
        self.retries = other.retries.or(self.retries);
        self.workers = other.workers.or(self.workers);
        self.data_dir = other.data_dir.or_else(|| self.data_dir.take());
    }
}

/// Search for `name` in `start` and each of its parents.
fn find_in_parents(start: &Path, name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
