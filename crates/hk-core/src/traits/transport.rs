//! Remote shell and file transfer trait

use async_trait::async_trait;
use std::fmt;
use std::path::Path;

use crate::error::Result;

/// Rendered connection parameters of a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    pub user: String,
    pub port: u16,
}

impl Connection {
    /// `user@host` destination
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Transport to managed hosts
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Open an interactive shell, or run `command` on a terminal when given
    async fn shell(&self, conn: &Connection, command: Option<&str>) -> Result<()>;

    /// Copy `remote_path` into `local_dir` in archive mode, as root on the remote side
    async fn pull_elevated(&self, conn: &Connection, remote_path: &str, local_dir: &Path)
        -> Result<()>;
}
