//! Configuration-management engine trait

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::project::{Project, PLAYBOOK_FILE};

/// How a playbook run treats the managed hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Dry run reporting a diff of what would change
    Check,
    /// Apply changes
    Apply,
}

/// Arguments for one playbook run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookOptions {
    pub mode: RunMode,
    /// Restrict the run to one host
    pub limit: Option<String>,
    /// Only run tasks carrying one of these tags
    pub tags: Vec<String>,
}

impl PlaybookOptions {
    /// Engine arguments; unset filters are omitted rather than passed empty
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![PLAYBOOK_FILE.to_string()];

        if self.mode == RunMode::Check {
            args.push("--check".to_string());
            args.push("--diff".to_string());
        }

        if let Some(limit) = self.limit.as_deref().filter(|l| !l.is_empty()) {
            args.push("--limit".to_string());
            args.push(limit.to_string());
        }

        let tags: Vec<&str> = self
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if !tags.is_empty() {
            args.push("--tags".to_string());
            args.push(tags.join(","));
        }

        args
    }
}

/// Vault operations on a host secrets file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultOp {
    Encrypt,
    Edit,
}

/// The external configuration-management engine
#[async_trait]
pub trait ConfigEngine: Send + Sync {
    /// Render a template expression for a host against the project inventory
    async fn render(&self, project: &Project, host: &str, expression: &str) -> Result<String>;

    /// Run the project playbook from inside the project directory.
    ///
    /// Returns the engine's exit code unchanged.
    async fn run_playbook(&self, project: &Project, options: &PlaybookOptions) -> Result<i32>;

    /// Encrypt or interactively edit a vault file with the project master secret
    async fn vault(&self, project: &Project, op: VaultOp, file: &Path) -> Result<()>;

    /// Reinstall vendored roles and collections from a requirements file
    async fn install_dependencies(&self, project: &Project, requirements: &Path) -> Result<()>;
}
