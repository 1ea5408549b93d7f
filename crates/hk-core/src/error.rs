//! Core error types for hostkeeper

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, HkError>;

/// Top-level error type for hostkeeper
#[derive(Error, Debug)]
pub enum HkError {
    /// Project directory does not exist
    #[error("project '{name}' not found at {}", path.display())]
    ProjectNotFound { name: String, path: PathBuf },

    /// Project exists but lacks a required file
    #[error("project at {} is missing {missing}; run init-project first", path.display())]
    ProjectIncomplete { path: PathBuf, missing: String },

    /// Named host has no variables file
    #[error("host '{host}' not found (expected {})", path.display())]
    HostNotFound { host: String, path: PathBuf },

    /// No host given and the project does not have exactly one
    #[error("{}", ambiguous_message(project, candidates))]
    HostAmbiguous {
        project: String,
        candidates: Vec<String>,
    },

    /// Command needs an explicit host name
    #[error("a host name is required for this command")]
    HostRequired,

    /// Host is already listed in the inventory
    #[error("host '{0}' already exists in the inventory")]
    HostExists(String),

    /// Project, host or group name is not usable as a path component
    #[error("invalid name '{0}'")]
    InvalidName(String),

    /// Role has no defaults file in the source checkout
    #[error("role '{role}' not found (expected {})", path.display())]
    RoleNotFound { role: String, path: PathBuf },

    /// Installed engine does not match the pinned version
    #[error("engine version mismatch: expected {expected}, found {}", found.as_deref().unwrap_or("nothing"))]
    EnvironmentMismatch {
        expected: String,
        found: Option<String>,
    },

    /// No secure random source on this machine
    #[error("secure random generator unavailable: {0}")]
    GeneratorUnavailable(String),

    /// Vault operation attempted without a master secret
    #[error("vault master secret missing at {}", .0.display())]
    MasterSecretMissing(PathBuf),

    /// Operator declined the self-upgrade confirmation
    #[error("upgrade aborted")]
    UpgradeAborted,

    /// Fetched source does not contain a usable release
    #[error("invalid release: {0}")]
    ReleaseInvalid(String),

    /// Unrecognized command name
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// No command given
    #[error("no command given")]
    MissingCommand,

    /// Another invocation holds the project lock
    #[error("project is locked by process {pid} ({})", path.display())]
    ProjectLocked { pid: u32, path: PathBuf },

    /// External tool exited unsuccessfully
    #[error("{tool} failed ({status})")]
    ToolFailure { tool: String, status: String },

    /// External tool could not be started
    #[error("failed to run {tool}: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Engine output did not contain the rendered value
    #[error("could not render '{expression}' for host '{host}'")]
    RenderFailed { host: String, expression: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HkError {
    /// Whether this error aborts the invocation.
    ///
    /// A version mismatch is handled by recreating the environment and a
    /// missing generator degrades to manual placeholder replacement; both
    /// are reported but never end the process.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            HkError::EnvironmentMismatch { .. } | HkError::GeneratorUnavailable(_)
        )
    }

    pub(crate) fn tool_failure(tool: &str, status: std::process::ExitStatus) -> Self {
        HkError::ToolFailure {
            tool: tool.to_string(),
            status: status.to_string(),
        }
    }
}

fn ambiguous_message(project: &str, candidates: &[String]) -> String {
    if candidates.is_empty() {
        format!("project '{}' has no hosts; run init-host first", project)
    } else {
        format!(
            "project '{}' has {} hosts ({}); specify one",
            project,
            candidates.len(),
            candidates.join(", ")
        )
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// YAML parse error in a project file
    #[error("YAML parse error in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
