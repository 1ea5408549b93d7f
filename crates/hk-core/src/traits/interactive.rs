//! Interactive editor and pager sessions

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Sessions that block on the operator until they end
#[async_trait]
pub trait Interactive: Send + Sync {
    /// Open a file in the operator's editor
    async fn edit(&self, path: &Path) -> Result<()>;

    /// Show a file through the operator's pager
    async fn page(&self, path: &Path) -> Result<()>;
}
