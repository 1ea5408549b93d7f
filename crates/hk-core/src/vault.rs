//! Vault master secret and vault file operations

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{HkError, Result};
use crate::project::Project;
use crate::traits::{ConfigEngine, VaultOp};

/// Random bytes in a master secret, before encoding
pub const MASTER_SECRET_BYTES: usize = 48;

/// Header of an encrypted vault file
pub const VAULT_HEADER: &str = "$ANSIBLE_VAULT;";

/// Create the project master secret unless one exists.
///
/// Returns `true` when a new secret was written. An existing secret is
/// never touched: losing it makes every vault file unrecoverable.
pub fn generate_master_secret(project: &Project) -> Result<bool> {
    let path = project.master_secret();

    let mut bytes = [0u8; MASTER_SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| HkError::GeneratorUnavailable(e.to_string()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = match options.open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            tracing::debug!("Master secret already present at {:?}", path);
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };
    writeln!(file, "{}", encoded)?;

    tracing::info!("Generated vault master secret {:?}", path);
    Ok(true)
}

/// Whether a file already carries the vault header
pub fn is_encrypted(path: &Path) -> Result<bool> {
    let content = fs::read(path)?;
    Ok(content.starts_with(VAULT_HEADER.as_bytes()))
}

/// Encrypt a vault file in place; already encrypted files are left alone
pub async fn encrypt(engine: &dyn ConfigEngine, project: &Project, file: &Path) -> Result<bool> {
    require_master_secret(project)?;
    if is_encrypted(file)? {
        tracing::debug!("{:?} is already encrypted", file);
        return Ok(false);
    }
    engine.vault(project, VaultOp::Encrypt, file).await?;
    Ok(true)
}

/// Open a vault file in the editor through the engine
pub async fn edit(engine: &dyn ConfigEngine, project: &Project, file: &Path) -> Result<()> {
    require_master_secret(project)?;
    engine.vault(project, VaultOp::Edit, file).await
}

fn require_master_secret(project: &Project) -> Result<()> {
    let path = project.master_secret();
    if !path.is_file() {
        return Err(HkError::MasterSecretMissing(path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::traits::PlaybookOptions;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEngine {
        ops: Mutex<Vec<VaultOp>>,
    }

    #[async_trait]
    impl ConfigEngine for RecordingEngine {
        async fn render(&self, _: &Project, _: &str, _: &str) -> Result<String> {
            unreachable!()
        }
        async fn run_playbook(&self, _: &Project, _: &PlaybookOptions) -> Result<i32> {
            unreachable!()
        }
        async fn vault(&self, _: &Project, op: VaultOp, file: &Path) -> Result<()> {
            self.ops.lock().unwrap().push(op);
            if op == VaultOp::Encrypt {
                fs::write(file, format!("{}1.1;AES256\n6162\n", VAULT_HEADER))?;
            }
            Ok(())
        }
        async fn install_dependencies(&self, _: &Project, _: &Path) -> Result<()> {
            unreachable!()
        }
    }

    fn project() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            projects_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let project = Project::locate(&settings, "infra").unwrap();
        fs::create_dir_all(project.root()).unwrap();
        (dir, project)
    }

    #[test]
    fn test_master_secret_is_strong_and_private() {
        let (_dir, project) = project();
        assert!(generate_master_secret(&project).unwrap());

        let content = fs::read_to_string(project.master_secret()).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(content.trim())
            .unwrap();
        assert!(decoded.len() >= 32);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(project.master_secret())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_master_secret_is_never_overwritten() {
        let (_dir, project) = project();
        fs::write(project.master_secret(), "keep-me\n").unwrap();
        assert!(!generate_master_secret(&project).unwrap());
        assert_eq!(
            fs::read_to_string(project.master_secret()).unwrap(),
            "keep-me\n"
        );
    }

    #[tokio::test]
    async fn test_encrypt_requires_master_secret() {
        let (_dir, project) = project();
        let file = project.root().join("x.vault.yml");
        fs::write(&file, "a: b\n").unwrap();

        let engine = RecordingEngine::default();
        let err = encrypt(&engine, &project, &file).await.unwrap_err();
        assert!(matches!(err, HkError::MasterSecretMissing(_)));
        assert!(engine.ops.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_encrypt_skips_encrypted_files() {
        let (_dir, project) = project();
        generate_master_secret(&project).unwrap();
        let file = project.root().join("x.vault.yml");
        fs::write(&file, "a: b\n").unwrap();

        let engine = RecordingEngine::default();
        assert!(encrypt(&engine, &project, &file).await.unwrap());
        assert!(is_encrypted(&file).unwrap());
        assert!(!encrypt(&engine, &project, &file).await.unwrap());
        assert_eq!(*engine.ops.lock().unwrap(), vec![VaultOp::Encrypt]);
    }
}
