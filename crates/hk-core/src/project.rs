//! Projects, hosts and their resolution from the on-disk layout

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::config::Settings;
use crate::error::{ConfigError, HkError, Result};

/// Project used when none is given on the command line
pub const DEFAULT_PROJECT: &str = "default";

/// Group whose variables apply to every host
pub const ALL_GROUP: &str = "all";

pub const INVENTORY_FILE: &str = "inventory.yml";
pub const PLAYBOOK_FILE: &str = "playbook.yml";
pub const ENGINE_CONFIG_FILE: &str = "ansible.cfg";
pub const MASTER_SECRET_FILE: &str = ".vault-secret";
pub const LOCK_FILE: &str = ".hostkeeper.lock";

/// A deployment project rooted at `<projects_root>/<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    name: String,
    root: PathBuf,
}

impl Project {
    /// Locate a project without checking that it exists
    pub fn locate(settings: &Settings, name: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            root: settings.projects_root.join(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn inventory(&self) -> PathBuf {
        self.root.join(INVENTORY_FILE)
    }

    pub fn playbook(&self) -> PathBuf {
        self.root.join(PLAYBOOK_FILE)
    }

    pub fn engine_config(&self) -> PathBuf {
        self.root.join(ENGINE_CONFIG_FILE)
    }

    pub fn group_vars_dir(&self) -> PathBuf {
        self.root.join("group_vars")
    }

    pub fn host_vars_dir(&self) -> PathBuf {
        self.root.join("host_vars")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn master_secret(&self) -> PathBuf {
        self.root.join(MASTER_SECRET_FILE)
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.root.join(".venv")
    }

    pub fn vendor_dir(&self) -> PathBuf {
        self.root.join("vendor")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Paths of a host in this project, whether or not it exists yet
    pub fn host(&self, name: &str) -> Result<Host> {
        validate_name(name)?;
        let dir = self.host_vars_dir().join(name);
        Ok(Host {
            name: name.to_string(),
            vars_file: dir.join(format!("{}.yml", name)),
            vault_file: dir.join(format!("{}.vault.yml", name)),
            dir,
        })
    }

    /// Variables file of a group
    pub fn group_vars_file(&self, group: &str) -> PathBuf {
        self.group_vars_dir().join(format!("{}.yml", group))
    }

    /// Fail unless inventory and playbook are present
    pub fn require_files(&self) -> Result<()> {
        for (path, what) in [
            (self.inventory(), INVENTORY_FILE),
            (self.playbook(), PLAYBOOK_FILE),
        ] {
            if !path.is_file() {
                return Err(HkError::ProjectIncomplete {
                    path: self.root.clone(),
                    missing: what.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Host directories under `host_vars/`, sorted by name
    pub fn host_dirs(&self) -> Result<Vec<String>> {
        let dir = self.host_vars_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut hosts = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    hosts.push(name.to_string());
                }
            }
        }
        hosts.sort();
        Ok(hosts)
    }

    /// Every host named anywhere in the inventory
    pub fn inventory_hosts(&self) -> Result<BTreeSet<String>> {
        let path = self.inventory();
        let content = fs::read_to_string(&path)?;
        let doc: Value = serde_yaml::from_str(&content)
            .map_err(|source| ConfigError::Yaml { path, source })?;

        let mut hosts = BTreeSet::new();
        if let Value::Mapping(groups) = &doc {
            for group in groups.values() {
                collect_hosts(group, &mut hosts);
            }
        }
        Ok(hosts)
    }
}

fn collect_hosts(group: &Value, hosts: &mut BTreeSet<String>) {
    let Value::Mapping(group) = group else {
        return;
    };
    if let Some(Value::Mapping(members)) = group.get("hosts") {
        hosts.extend(members.keys().filter_map(|k| k.as_str().map(String::from)));
    }
    if let Some(Value::Mapping(children)) = group.get("children") {
        for child in children.values() {
            collect_hosts(child, hosts);
        }
    }
}

/// A managed host of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub dir: PathBuf,
    pub vars_file: PathBuf,
    pub vault_file: PathBuf,
}

/// Reject names that cannot be used as a single path component
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(HkError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Resolve a project that must already exist
pub fn resolve_project(settings: &Settings, name: &str) -> Result<Project> {
    let project = Project::locate(settings, name)?;
    if !project.exists() {
        return Err(HkError::ProjectNotFound {
            name: name.to_string(),
            path: project.root().to_path_buf(),
        });
    }
    Ok(project)
}

/// Resolve a host by name, or pick the only host when no name is given
pub fn resolve_host(project: &Project, name: Option<&str>) -> Result<Host> {
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        let host = project.host(name)?;
        if !host.vars_file.is_file() {
            return Err(HkError::HostNotFound {
                host: name.to_string(),
                path: host.vars_file,
            });
        }
        return Ok(host);
    }

    let mut candidates = project.host_dirs()?;
    if candidates.len() == 1 {
        let only = candidates.remove(0);
        tracing::info!("No host given, using the only host '{}'", only);
        return project.host(&only);
    }

    Err(HkError::HostAmbiguous {
        project: project.name().to_string(),
        candidates,
    })
}

/// Resolve a group name, defaulting to the group of all hosts
pub fn resolve_group(name: Option<&str>) -> Result<String> {
    match name.filter(|n| !n.is_empty()) {
        Some(group) => {
            validate_name(group)?;
            Ok(group.to_string())
        }
        None => Ok(ALL_GROUP.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_in(dir: &TempDir, name: &str) -> Project {
        let settings = Settings {
            projects_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let project = Project::locate(&settings, name).unwrap();
        fs::create_dir_all(project.host_vars_dir()).unwrap();
        project
    }

    fn add_host(project: &Project, name: &str) {
        let host = project.host(name).unwrap();
        fs::create_dir_all(&host.dir).unwrap();
        fs::write(&host.vars_file, "---\n").unwrap();
    }

    #[test]
    fn test_resolve_missing_project() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            projects_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let err = resolve_project(&settings, "nope").unwrap_err();
        assert!(matches!(err, HkError::ProjectNotFound { .. }));
    }

    #[test]
    fn test_host_paths_follow_convention() {
        let dir = TempDir::new().unwrap();
        let project = project_in(&dir, "infra");
        let host = project.host("db1.example.org").unwrap();
        assert!(host
            .vars_file
            .ends_with("infra/host_vars/db1.example.org/db1.example.org.yml"));
        assert!(host
            .vault_file
            .ends_with("infra/host_vars/db1.example.org/db1.example.org.vault.yml"));
    }

    #[test]
    fn test_zero_hosts_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        let project = project_in(&dir, "infra");
        let err = resolve_host(&project, None).unwrap_err();
        match err {
            HkError::HostAmbiguous { candidates, .. } => assert!(candidates.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_single_host_is_selected() {
        let dir = TempDir::new().unwrap();
        let project = project_in(&dir, "infra");
        add_host(&project, "web.example.org");
        let host = resolve_host(&project, None).unwrap();
        assert_eq!(host.name, "web.example.org");
    }

    #[test]
    fn test_two_hosts_are_ambiguous() {
        let dir = TempDir::new().unwrap();
        let project = project_in(&dir, "infra");
        add_host(&project, "b.example.org");
        add_host(&project, "a.example.org");
        let err = resolve_host(&project, None).unwrap_err();
        match err {
            HkError::HostAmbiguous { candidates, .. } => {
                assert_eq!(candidates, vec!["a.example.org", "b.example.org"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_named_host_needs_vars_file() {
        let dir = TempDir::new().unwrap();
        let project = project_in(&dir, "infra");
        add_host(&project, "a.example.org");
        assert!(resolve_host(&project, Some("a.example.org")).is_ok());
        let err = resolve_host(&project, Some("b.example.org")).unwrap_err();
        assert!(matches!(err, HkError::HostNotFound { .. }));
    }

    #[test]
    fn test_empty_host_name_means_unset() {
        let dir = TempDir::new().unwrap();
        let project = project_in(&dir, "infra");
        add_host(&project, "a.example.org");
        assert_eq!(resolve_host(&project, Some("")).unwrap().name, "a.example.org");
    }

    #[test]
    fn test_resolve_group() {
        assert_eq!(resolve_group(None).unwrap(), "all");
        assert_eq!(resolve_group(Some("")).unwrap(), "all");
        assert_eq!(resolve_group(Some("dbservers")).unwrap(), "dbservers");
        assert!(resolve_group(Some("../etc")).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("db1.example.org").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
    }

    #[test]
    fn test_require_files() {
        let dir = TempDir::new().unwrap();
        let project = project_in(&dir, "infra");
        let err = project.require_files().unwrap_err();
        assert!(matches!(err, HkError::ProjectIncomplete { .. }));

        fs::write(project.inventory(), "all:\n").unwrap();
        fs::write(project.playbook(), "---\n").unwrap();
        project.require_files().unwrap();
    }

    #[test]
    fn test_inventory_hosts_walks_children() {
        let dir = TempDir::new().unwrap();
        let project = project_in(&dir, "infra");
        fs::write(
            project.inventory(),
            r#"
all:
  hosts:
    web.example.org:
  children:
    db:
      hosts:
        db1.example.org:
          ansible_port: 2222
"#,
        )
        .unwrap();
        let hosts = project.inventory_hosts().unwrap();
        assert!(hosts.contains("web.example.org"));
        assert!(hosts.contains("db1.example.org"));
        assert_eq!(hosts.len(), 2);
    }
}
