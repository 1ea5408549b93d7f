//! Ansible implementation of [`ConfigEngine`]

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::config::Settings;
use crate::error::{HkError, Result};
use crate::process;
use crate::project::Project;
use crate::traits::{ConfigEngine, PlaybookOptions, VaultOp};

/// Ansible from a project's isolated environment
#[derive(Debug, Clone)]
pub struct Ansible {
    roles_dir: PathBuf,
    editor: String,
}

impl Ansible {
    pub fn new(settings: &Settings) -> Self {
        Self {
            roles_dir: settings.roles_dir(),
            editor: settings.editor.clone(),
        }
    }

    /// Command for an engine executable, activated for `project`
    fn command(&self, project: &Project, program: &str) -> Command {
        let venv = project.venv_dir();
        let bin = venv.join("bin");
        let vendor = project.vendor_dir();

        let mut cmd = Command::new(bin.join(program));
        cmd.current_dir(project.root())
            .env("VIRTUAL_ENV", &venv)
            .env("PATH", prepend_path(&bin))
            .env("ANSIBLE_CONFIG", project.engine_config())
            .env(
                "ANSIBLE_ROLES_PATH",
                join_search_path(&[vendor.join("roles"), self.roles_dir.clone()]),
            )
            .env("ANSIBLE_COLLECTIONS_PATH", vendor.join("collections"));

        // secret travels as a file reference in the environment, never as an argument
        let secret = project.master_secret();
        if secret.is_file() {
            cmd.env("ANSIBLE_VAULT_PASSWORD_FILE", secret);
        }
        cmd
    }
}

#[async_trait]
impl ConfigEngine for Ansible {
    async fn render(&self, project: &Project, host: &str, expression: &str) -> Result<String> {
        let mut cmd = self.command(project, "ansible");
        cmd.arg(host)
            .arg("-i")
            .arg(project.inventory())
            .args(["-m", "ansible.builtin.debug", "-a"])
            .arg(format!("msg={{{{ {} }}}}", expression))
            .env("ANSIBLE_LOAD_CALLBACK_PLUGINS", "1")
            .env("ANSIBLE_STDOUT_CALLBACK", "json")
            .stderr(std::process::Stdio::inherit());

        let output = process::output("ansible", &mut cmd).await?;
        if !output.status.success() {
            return Err(HkError::tool_failure("ansible", output.status));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_debug_output(&stdout, host).ok_or_else(|| HkError::RenderFailed {
            host: host.to_string(),
            expression: expression.to_string(),
        })
    }

    async fn run_playbook(&self, project: &Project, options: &PlaybookOptions) -> Result<i32> {
        let mut cmd = self.command(project, "ansible-playbook");
        cmd.args(options.to_args());
        let status = process::status("ansible-playbook", &mut cmd).await?;
        Ok(process::exit_code(status))
    }

    async fn vault(&self, project: &Project, op: VaultOp, file: &Path) -> Result<()> {
        let secret = project.master_secret();
        if !secret.is_file() {
            return Err(HkError::MasterSecretMissing(secret));
        }

        let mut cmd = self.command(project, "ansible-vault");
        match op {
            VaultOp::Encrypt => {
                cmd.arg("encrypt").arg(file);
            }
            VaultOp::Edit => {
                cmd.arg("edit").arg(file).env("EDITOR", &self.editor);
            }
        }
        process::run("ansible-vault", &mut cmd).await
    }

    async fn install_dependencies(&self, project: &Project, requirements: &Path) -> Result<()> {
        let mut cmd = self.command(project, "ansible-galaxy");
        cmd.arg("install").arg("-r").arg(requirements).arg("--force");
        process::run("ansible-galaxy", &mut cmd).await
    }
}

/// Extract the rendered `msg` for `host` from JSON callback output
pub fn parse_debug_output(stdout: &str, host: &str) -> Option<String> {
    // warnings may precede the JSON document
    let start = stdout.find('{')?;
    let doc: Value = serde_json::from_str(&stdout[start..]).ok()?;

    let msg = doc
        .get("plays")?
        .get(0)?
        .get("tasks")?
        .get(0)?
        .get("hosts")?
        .get(host)?
        .get("msg")?;

    match msg {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn prepend_path(dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| dir.as_os_str().to_owned())
}

fn join_search_path(paths: &[PathBuf]) -> OsString {
    std::env::join_paths(paths).unwrap_or_default()
}
