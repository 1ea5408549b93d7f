//! Self-upgrade from the canonical source repository
//!
//! The upgrade is a fetch, a confirmation and a replacement. Nothing on
//! disk outside the source checkout changes unless the operator answers
//! exactly `YES`.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::process::Command;

use crate::config::Settings;
use crate::error::{HkError, Result};
use crate::process;
use crate::traits::{Confirm, Replacer, SourceRepo};

/// Version file at the root of the source checkout
pub const VERSION_FILE: &str = "VERSION";

/// Release executable inside the source checkout
pub const RELEASE_ARTIFACT: &str = "dist/hostkeeper";

/// The only answer that confirms an upgrade
pub const CONFIRMATION: &str = "YES";

/// Version, commit and executable of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: String,
    pub commit: String,
    pub artifact: PathBuf,
    pub digest: String,
}

impl Release {
    /// The running build
    pub fn current(exe: &Path) -> Result<Self> {
        Ok(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("HOSTKEEPER_COMMIT")
                .unwrap_or("unknown")
                .to_string(),
            artifact: exe.to_path_buf(),
            digest: file_digest(exe)?,
        })
    }

    fn describe(&self) -> String {
        format!(
            "{} ({}) sha256:{}",
            self.version,
            self.commit,
            &self.digest[..self.digest.len().min(12)]
        )
    }
}

/// Result of [`self_upgrade`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// Fetched release is byte-identical to the running one
    UpToDate(Release),
    /// Running executable was replaced
    Upgraded { from: Release, to: Release },
}

/// Hex SHA-256 of a file
pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Read the release contained in a synced checkout
pub async fn read_release(repo: &dyn SourceRepo, dir: &Path) -> Result<Release> {
    let version_file = dir.join(VERSION_FILE);
    let version = fs::read_to_string(&version_file)
        .map_err(|e| HkError::ReleaseInvalid(format!("{}: {}", version_file.display(), e)))?;
    let version = version.trim();
    if version.is_empty() {
        return Err(HkError::ReleaseInvalid(format!(
            "{} is empty",
            version_file.display()
        )));
    }

    let artifact = dir.join(RELEASE_ARTIFACT);
    if !artifact.is_file() {
        return Err(HkError::ReleaseInvalid(format!(
            "missing executable {}",
            artifact.display()
        )));
    }

    Ok(Release {
        version: version.to_string(),
        commit: repo.revision(dir).await?,
        digest: file_digest(&artifact)?,
        artifact,
    })
}

/// Fetch the latest release and, once confirmed, install it over `current_exe`
pub async fn self_upgrade(
    settings: &Settings,
    repo: &dyn SourceRepo,
    confirm: &dyn Confirm,
    replacer: &dyn Replacer,
    current_exe: &Path,
) -> Result<UpgradeOutcome> {
    repo.sync(
        &settings.source_url,
        &settings.release_channel,
        &settings.cache_dir,
    )
    .await?;

    let current = Release::current(current_exe)?;
    let latest = read_release(repo, &settings.cache_dir).await?;

    if latest.digest == current.digest {
        return Ok(UpgradeOutcome::UpToDate(current));
    }

    let prompt = format!(
        "Current: {}\nNew:     {}\nReplace {}? Type {} to confirm: ",
        current.describe(),
        latest.describe(),
        current_exe.display(),
        CONFIRMATION
    );
    let answer = confirm.ask(&prompt)?;
    if answer != CONFIRMATION {
        tracing::info!("Upgrade declined");
        return Err(HkError::UpgradeAborted);
    }

    replacer.replace(&latest.artifact, current_exe).await?;
    tracing::info!("Replaced {:?} with {}", current_exe, latest.version);
    Ok(UpgradeOutcome::Upgraded {
        from: current,
        to: latest,
    })
}

/// Git checkout following a release branch
#[derive(Debug, Clone, Default)]
pub struct GitSource;

impl GitSource {
    async fn git(dir: Option<&Path>, args: &[&str]) -> Result<()> {
        let mut cmd = Command::new("git");
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args);
        process::run("git", &mut cmd).await
    }
}

#[async_trait]
impl SourceRepo for GitSource {
    async fn sync(&self, url: &str, channel: &str, dir: &Path) -> Result<()> {
        if dir.join(".git").is_dir() {
            tracing::info!("Updating {:?} to {}", dir, channel);
            Self::git(Some(dir), &["fetch", "--quiet", "origin"]).await?;
            Self::git(Some(dir), &["checkout", "--quiet", channel]).await?;
            return Self::git(Some(dir), &["pull", "--quiet", "--ff-only", "origin", channel]).await;
        }

        if let Some(parent) = dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tracing::info!("Cloning {} into {:?}", url, dir);
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--quiet", "--branch", channel, url])
            .arg(dir);
        process::run("git", &mut cmd).await
    }

    async fn revision(&self, dir: &Path) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(dir)
            .args(["rev-parse", "--short", "HEAD"]);
        let output = process::output("git", &mut cmd).await?;
        if !output.status.success() {
            return Err(HkError::tool_failure("git", output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Confirmation read from standard input
#[derive(Debug, Clone, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn ask(&self, prompt: &str) -> Result<String> {
        print!("{}", prompt);
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Replace a file through a sibling staging copy and a rename
#[derive(Debug, Clone, Default)]
pub struct FsReplacer;

impl FsReplacer {
    fn staging_path(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".new");
        target.with_file_name(name)
    }

    fn replace_direct(staged: &Path, target: &Path) -> io::Result<()> {
        let tmp = Self::staging_path(target);
        fs::copy(staged, &tmp)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o755))?;
        }

        if let Err(e) = fs::rename(&tmp, target) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl Replacer for FsReplacer {
    async fn replace(&self, staged: &Path, target: &Path) -> Result<()> {
        match Self::replace_direct(staged, target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                tracing::warn!("{:?} is not writable, retrying with sudo", target);
                let mut cmd = Command::new("sudo");
                cmd.args(["install", "-m", "0755"]).arg(staged).arg(target);
                process::run("sudo", &mut cmd).await
            }
            Err(e) => Err(e.into()),
        }
    }
}
