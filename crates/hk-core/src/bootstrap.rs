//! Per-project isolated engine environment
//!
//! The environment is valid only when it reports exactly the pinned engine
//! version. Anything else (no environment, a broken interpreter, a
//! different version) leads to a full rebuild.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::engine::{engine_requirement, CRYPTO_REQUIREMENT, ENGINE_PACKAGE, ENGINE_VERSION};
use crate::error::{HkError, Result};
use crate::process;
use crate::project::Project;
use crate::traits::Toolchain;

/// What [`ensure_environment`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The pinned engine was already installed
    Ready,
    /// The environment was rebuilt
    Recreated,
}

/// Compare an installed version with the pinned one after trimming
pub fn check_version(installed: Option<&str>) -> Result<()> {
    let found = installed.map(str::trim).filter(|v| !v.is_empty());
    if found == Some(ENGINE_VERSION) {
        return Ok(());
    }
    Err(HkError::EnvironmentMismatch {
        expected: ENGINE_VERSION.to_string(),
        found: found.map(String::from),
    })
}

/// Guarantee that `project` has the pinned engine installed
pub async fn ensure_environment(
    toolchain: &dyn Toolchain,
    project: &Project,
) -> Result<BootstrapOutcome> {
    let env = project.venv_dir();

    let installed = toolchain.installed_version(&env, ENGINE_PACKAGE).await?;
    match check_version(installed.as_deref()) {
        Ok(()) => {
            tracing::debug!("Engine {} ready in {:?}", ENGINE_VERSION, env);
            return Ok(BootstrapOutcome::Ready);
        }
        Err(mismatch) => tracing::info!("{}; rebuilding {:?}", mismatch, env),
    }

    toolchain.create_env(&env).await?;
    toolchain.install(&env, CRYPTO_REQUIREMENT).await?;
    toolchain.install(&env, &engine_requirement()).await?;

    // a rebuild that still reports the wrong version is not usable
    let installed = toolchain.installed_version(&env, ENGINE_PACKAGE).await?;
    check_version(installed.as_deref()).map_err(|e| HkError::ToolFailure {
        tool: "pip".to_string(),
        status: e.to_string(),
    })?;

    tracing::info!("Installed engine {} in {:?}", ENGINE_VERSION, env);
    Ok(BootstrapOutcome::Recreated)
}

/// Python `venv` + `pip` toolchain
#[derive(Debug, Clone)]
pub struct PipToolchain {
    python: String,
}

impl PipToolchain {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn env_python(env: &Path) -> std::path::PathBuf {
        env.join("bin").join("python")
    }
}

#[async_trait]
impl Toolchain for PipToolchain {
    async fn installed_version(&self, env: &Path, package: &str) -> Result<Option<String>> {
        let python = Self::env_python(env);
        if !python.is_file() {
            return Ok(None);
        }

        let mut cmd = Command::new(&python);
        cmd.args(["-m", "pip", "show", package])
            .env("VIRTUAL_ENV", env)
            .stderr(std::process::Stdio::null());

        // a broken environment counts as missing, not as an error
        let output = match process::output("pip", &mut cmd).await {
            Ok(output) if output.status.success() => output,
            Ok(_) | Err(_) => return Ok(None),
        };

        Ok(parse_pip_show_version(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    async fn create_env(&self, env: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "venv", "--clear"]).arg(env);
        process::run("venv", &mut cmd).await
    }

    async fn install(&self, env: &Path, requirement: &str) -> Result<()> {
        let mut cmd = Command::new(Self::env_python(env));
        cmd.args(["-m", "pip", "install", "--quiet", requirement])
            .env("VIRTUAL_ENV", env);
        process::run("pip", &mut cmd).await
    }
}

/// Read the `Version:` field of `pip show` output
pub fn parse_pip_show_version(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::sync::Mutex;

    /// Fake toolchain recording every mutating call
    #[derive(Default)]
    struct FakeToolchain {
        version: Mutex<Option<String>>,
        calls: Mutex<Vec<String>>,
        install_result: Option<String>,
    }

    impl FakeToolchain {
        fn with_version(version: Option<&str>) -> Self {
            Self {
                version: Mutex::new(version.map(String::from)),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Toolchain for FakeToolchain {
        async fn installed_version(&self, _env: &Path, _package: &str) -> Result<Option<String>> {
            Ok(self.version.lock().unwrap().clone())
        }

        async fn create_env(&self, _env: &Path) -> Result<()> {
            self.calls.lock().unwrap().push("create".into());
            *self.version.lock().unwrap() = None;
            Ok(())
        }

        async fn install(&self, _env: &Path, requirement: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("install {}", requirement));
            if requirement.starts_with("ansible==") {
                let installed = self
                    .install_result
                    .clone()
                    .unwrap_or_else(|| ENGINE_VERSION.to_string());
                *self.version.lock().unwrap() = Some(installed);
            }
            Ok(())
        }
    }

    fn project() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            projects_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let project = Project::locate(&settings, "infra").unwrap();
        (dir, project)
    }

    #[test]
    fn test_check_version_normalizes_whitespace() {
        assert!(check_version(Some(&format!(" {}\n", ENGINE_VERSION))).is_ok());
        assert!(matches!(
            check_version(Some("2.9.0")),
            Err(HkError::EnvironmentMismatch { .. })
        ));
        assert!(check_version(None).is_err());
        assert!(check_version(Some("")).is_err());
    }

    #[tokio::test]
    async fn test_matching_version_installs_nothing() {
        let (_dir, project) = project();
        let toolchain = FakeToolchain::with_version(Some(ENGINE_VERSION));
        let outcome = ensure_environment(&toolchain, &project).await.unwrap();
        assert_eq!(outcome, BootstrapOutcome::Ready);
        assert!(toolchain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_environment_is_created_in_order() {
        let (_dir, project) = project();
        let toolchain = FakeToolchain::with_version(None);
        let outcome = ensure_environment(&toolchain, &project).await.unwrap();
        assert_eq!(outcome, BootstrapOutcome::Recreated);
        assert_eq!(
            toolchain.calls(),
            vec![
                "create".to_string(),
                format!("install {}", CRYPTO_REQUIREMENT),
                format!("install {}", engine_requirement()),
            ]
        );
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let (_dir, project) = project();
        let toolchain = FakeToolchain::with_version(Some("2.10.7"));

        let first = ensure_environment(&toolchain, &project).await.unwrap();
        let second = ensure_environment(&toolchain, &project).await.unwrap();

        assert_eq!(first, BootstrapOutcome::Recreated);
        assert_eq!(second, BootstrapOutcome::Ready);
        let creates = toolchain.calls().iter().filter(|c| *c == "create").count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_rebuild_reporting_wrong_version_is_fatal() {
        let (_dir, project) = project();
        let toolchain = FakeToolchain {
            install_result: Some("0.0.1".into()),
            ..Default::default()
        };
        let err = ensure_environment(&toolchain, &project).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_parse_pip_show_version() {
        let stdout = "Name: ansible\nVersion: 9.5.1\nSummary: Radically simple IT automation\n";
        assert_eq!(parse_pip_show_version(stdout).as_deref(), Some("9.5.1"));
        assert_eq!(parse_pip_show_version("Name: ansible\n"), None);
    }
}
