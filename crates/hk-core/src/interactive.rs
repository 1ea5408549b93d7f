//! Editor and pager launched on the operator's terminal

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::Settings;
use crate::error::{ConfigError, Result};
use crate::process::{self, split_command_line};
use crate::traits::Interactive;

/// `$EDITOR` and `$PAGER`, each possibly carrying arguments
#[derive(Debug, Clone)]
pub struct SystemInteractive {
    editor: String,
    pager: String,
}

impl SystemInteractive {
    pub fn new(settings: &Settings) -> Self {
        Self {
            editor: settings.editor.clone(),
            pager: settings.pager.clone(),
        }
    }

    fn command(line: &str, path: &Path) -> Result<(String, Command)> {
        let (program, args) = split_command_line(line).ok_or_else(|| {
            ConfigError::Invalid(format!("empty command line for {}", path.display()))
        })?;
        let mut cmd = Command::new(&program);
        cmd.args(args).arg(path);
        Ok((program, cmd))
    }
}

#[async_trait]
impl Interactive for SystemInteractive {
    async fn edit(&self, path: &Path) -> Result<()> {
        let (program, mut cmd) = Self::command(&self.editor, path)?;
        process::run(&program, &mut cmd).await
    }

    async fn page(&self, path: &Path) -> Result<()> {
        let (program, mut cmd) = Self::command(&self.pager, path)?;
        process::run(&program, &mut cmd).await
    }
}
