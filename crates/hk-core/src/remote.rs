//! Remote shell sessions and backup transfer
//!
//! Connection parameters come from the engine, so inventory defaults and
//! per-host overrides apply exactly as they do for a playbook run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use tokio::process::Command;

use crate::engine::{CONNECTION_PORT_EXPR, CONNECTION_USER_EXPR};
use crate::error::{HkError, Result};
use crate::process;
use crate::project::Project;
use crate::traits::{ConfigEngine, Connection, RemoteTransport};

/// Directory pulled from each host by `fetch-backups`
pub const REMOTE_BACKUP_PATH: &str = "/var/backups/";

/// System log followed by `logs`
pub const SYSTEM_LOG: &str = "/var/log/syslog";

/// Render the user and port a host is reached on
pub async fn connection_params(
    engine: &dyn ConfigEngine,
    project: &Project,
    host: &str,
) -> Result<Connection> {
    let user = engine.render(project, host, CONNECTION_USER_EXPR).await?;
    let port = engine.render(project, host, CONNECTION_PORT_EXPR).await?;

    let port = port.trim().parse::<u16>().map_err(|_| HkError::RenderFailed {
        host: host.to_string(),
        expression: CONNECTION_PORT_EXPR.to_string(),
    })?;
    let user = user.trim();
    if user.is_empty() {
        return Err(HkError::RenderFailed {
            host: host.to_string(),
            expression: CONNECTION_USER_EXPR.to_string(),
        });
    }

    let conn = Connection {
        host: host.to_string(),
        user: user.to_string(),
        port,
    };
    tracing::debug!("Connection parameters: {}", conn);
    Ok(conn)
}

/// Local directory for one backup run, e.g. `backups/db1-20240131-235959`
pub fn backup_destination<Tz>(backups_dir: &Path, host: &str, at: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    backups_dir.join(format!("{}-{}", host, at.format("%Y%m%d-%H%M%S")))
}

/// Remote command following the system log, elevated when it is unreadable
pub fn log_viewer_command() -> String {
    format!(
        "if [ -r {log} ]; then less +F {log}; else sudo less +F {log}; fi",
        log = SYSTEM_LOG
    )
}

/// Remote listing of `path`
pub fn ls_command(path: &str) -> String {
    let path = if path.trim().is_empty() { "." } else { path };
    format!("ls -la {}", shell_quote(path))
}

/// Quote `arg` for a POSIX shell
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./~".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// OpenSSH and rsync from the operator's `PATH`
#[derive(Debug, Clone, Default)]
pub struct OpenSsh;

impl OpenSsh {
    fn ssh_args(conn: &Connection, command: Option<&str>) -> Vec<String> {
        let mut args = vec!["-p".to_string(), conn.port.to_string()];
        if let Some(command) = command {
            // a pager needs a terminal on the remote side
            args.push("-t".to_string());
            args.push(conn.destination());
            args.push(command.to_string());
        } else {
            args.push(conn.destination());
        }
        args
    }

    fn rsync_args(conn: &Connection, remote_path: &str, local_dir: &Path) -> Vec<String> {
        let mut dest = local_dir.display().to_string();
        if !dest.ends_with('/') {
            dest.push('/');
        }
        vec![
            "-az".to_string(),
            "--rsync-path=sudo rsync".to_string(),
            "-e".to_string(),
            format!("ssh -p {}", conn.port),
            format!("{}:{}", conn.destination(), remote_path),
            dest,
        ]
    }
}

#[async_trait]
impl RemoteTransport for OpenSsh {
    async fn shell(&self, conn: &Connection, command: Option<&str>) -> Result<()> {
        let mut cmd = Command::new("ssh");
        cmd.args(Self::ssh_args(conn, command));
        process::run("ssh", &mut cmd).await
    }

    async fn pull_elevated(
        &self,
        conn: &Connection,
        remote_path: &str,
        local_dir: &Path,
    ) -> Result<()> {
        tokio::fs::create_dir_all(local_dir).await?;
        let mut cmd = Command::new("rsync");
        cmd.args(Self::rsync_args(conn, remote_path, local_dir));
        process::run("rsync", &mut cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::traits::{PlaybookOptions, VaultOp};
    use chrono::{TimeZone, Utc};

    struct StaticEngine {
        user: &'static str,
        port: &'static str,
    }

    #[async_trait]
    impl ConfigEngine for StaticEngine {
        async fn render(&self, _: &Project, _: &str, expression: &str) -> Result<String> {
            Ok(if expression == CONNECTION_USER_EXPR {
                self.user.to_string()
            } else {
                self.port.to_string()
            })
        }
        async fn run_playbook(&self, _: &Project, _: &PlaybookOptions) -> Result<i32> {
            unreachable!()
        }
        async fn vault(&self, _: &Project, _: VaultOp, _: &Path) -> Result<()> {
            unreachable!()
        }
        async fn install_dependencies(&self, _: &Project, _: &Path) -> Result<()> {
            unreachable!()
        }
    }

    fn project() -> Project {
        Project::locate(&Settings::default(), "infra").unwrap()
    }

    fn conn() -> Connection {
        Connection {
            host: "db1.example.org".into(),
            user: "deploy".into(),
            port: 2222,
        }
    }

    #[tokio::test]
    async fn test_connection_params() {
        let engine = StaticEngine {
            user: "deploy\n",
            port: "2222",
        };
        let conn = connection_params(&engine, &project(), "db1.example.org")
            .await
            .unwrap();
        assert_eq!(conn, self::conn());
    }

    #[tokio::test]
    async fn test_bad_port_fails() {
        let engine = StaticEngine {
            user: "root",
            port: "not-a-port",
        };
        let err = connection_params(&engine, &project(), "db1.example.org")
            .await
            .unwrap_err();
        assert!(matches!(err, HkError::RenderFailed { .. }));
    }

    #[test]
    fn test_backup_destination() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap();
        assert_eq!(
            backup_destination(Path::new("/p/backups"), "db1", &at),
            PathBuf::from("/p/backups/db1-20240131-235958")
        );
    }

    #[test]
    fn test_ssh_args() {
        assert_eq!(
            OpenSsh::ssh_args(&conn(), None),
            vec!["-p", "2222", "deploy@db1.example.org"]
        );
        assert_eq!(
            OpenSsh::ssh_args(&conn(), Some("ls -la .")),
            vec!["-p", "2222", "-t", "deploy@db1.example.org", "ls -la ."]
        );
    }

    #[test]
    fn test_rsync_args_are_elevated() {
        let args = OpenSsh::rsync_args(&conn(), REMOTE_BACKUP_PATH, Path::new("/p/backups/x"));
        assert_eq!(
            args,
            vec![
                "-az",
                "--rsync-path=sudo rsync",
                "-e",
                "ssh -p 2222",
                "deploy@db1.example.org:/var/backups/",
                "/p/backups/x/"
            ]
        );
    }

    #[test]
    fn test_log_viewer_falls_back_to_sudo() {
        let cmd = log_viewer_command();
        assert!(cmd.starts_with("if [ -r /var/log/syslog ]"));
        assert!(cmd.contains("else sudo less +F /var/log/syslog"));
    }

    #[test]
    fn test_ls_command_quotes() {
        assert_eq!(ls_command(""), "ls -la .");
        assert_eq!(ls_command("/etc/nginx"), "ls -la /etc/nginx");
        assert_eq!(ls_command("my dir"), "ls -la 'my dir'");
        assert_eq!(ls_command("it's"), r"ls -la 'it'\''s'");
    }
}
