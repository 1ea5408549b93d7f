//! Blocking-style helpers around external processes
//!
//! Every external call is awaited to completion before the caller
//! continues; there is never more than one child alive at a time.

use std::process::{ExitStatus, Output, Stdio};

use tokio::process::Command;

use crate::error::{HkError, Result};

/// Run a command with inherited stdio and return its exit status
pub async fn status(tool: &str, cmd: &mut Command) -> Result<ExitStatus> {
    tracing::debug!("Running {}: {:?}", tool, cmd.as_std());
    cmd.status()
        .await
        .map_err(|source| HkError::ToolUnavailable {
            tool: tool.to_string(),
            source,
        })
}

/// Run a command with inherited stdio, failing on a nonzero exit
pub async fn run(tool: &str, cmd: &mut Command) -> Result<()> {
    let status = status(tool, cmd).await?;
    if !status.success() {
        return Err(HkError::tool_failure(tool, status));
    }
    Ok(())
}

/// Run a command without stdin and capture its stdout.
///
/// Stderr is captured too unless the caller configured it beforehand.
pub async fn output(tool: &str, cmd: &mut Command) -> Result<Output> {
    tracing::debug!("Running {}: {:?}", tool, cmd.as_std());
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .output()
        .await
        .map_err(|source| HkError::ToolUnavailable {
            tool: tool.to_string(),
            source,
        })
}

/// Shell-style exit code of a finished process (signals map to 128 + n)
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Split a command line such as `code -w` into program and arguments
pub fn split_command_line(line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(String::from);
    let program = parts.next()?;
    Some((program, parts.collect()))
}
