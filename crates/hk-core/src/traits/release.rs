//! Self-upgrade seams: fetch, confirm, replace

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Version-controlled source of hostkeeper releases
#[async_trait]
pub trait SourceRepo: Send + Sync {
    /// Clone `url` into `dir`, or update `dir` to the tip of `channel`
    async fn sync(&self, url: &str, channel: &str, dir: &Path) -> Result<()>;

    /// Short commit identifier checked out in `dir`
    async fn revision(&self, dir: &Path) -> Result<String>;
}

/// Operator confirmation
pub trait Confirm: Send + Sync {
    /// Show `prompt` and return the operator's answer without its line ending
    fn ask(&self, prompt: &str) -> Result<String>;
}

/// Replacement of the running executable
#[async_trait]
pub trait Replacer: Send + Sync {
    /// Put `staged` in place of `target`
    async fn replace(&self, staged: &Path, target: &Path) -> Result<()>;
}
