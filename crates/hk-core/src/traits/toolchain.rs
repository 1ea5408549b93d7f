//! Isolated environment toolchain trait

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Package tooling for a project's isolated environment
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Version of `package` installed in the environment at `env`.
    ///
    /// Returns `Ok(None)` when the environment or the package is missing or
    /// the environment cannot be activated.
    async fn installed_version(&self, env: &Path, package: &str) -> Result<Option<String>>;

    /// Create a fresh, empty environment, discarding anything at `env`
    async fn create_env(&self, env: &Path) -> Result<()>;

    /// Install a pinned requirement such as `ansible==9.5.1`
    async fn install(&self, env: &Path, requirement: &str) -> Result<()>;
}
