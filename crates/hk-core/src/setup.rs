//! Project and host initialization
//!
//! Creates the conventional project layout and the files of a new host.
//! Nothing that already exists is overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::{ConfigError, HkError, Result};
use crate::project::{Host, Project, ALL_GROUP};
use crate::vault::generate_master_secret;

/// Files and directories produced by [`init_project`]
#[derive(Debug, Default)]
pub struct ProjectSetup {
    /// Paths created by this call, in creation order
    pub created: Vec<PathBuf>,
    /// Whether a new master secret was generated
    pub master_secret_created: bool,
}

impl ProjectSetup {
    /// True when the project was already fully initialized
    pub fn was_initialized(&self) -> bool {
        self.created.is_empty() && !self.master_secret_created
    }
}

/// Create the project layout, filling in whatever is missing
pub fn init_project(project: &Project) -> Result<ProjectSetup> {
    let mut setup = ProjectSetup::default();

    for dir in [
        project.root().to_path_buf(),
        project.group_vars_dir(),
        project.host_vars_dir(),
        project.backups_dir(),
        project.vendor_dir().join("roles"),
        project.vendor_dir().join("collections"),
    ] {
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            setup.created.push(dir);
        }
    }

    for (path, content) in [
        (project.inventory(), DEFAULT_INVENTORY.to_string()),
        (project.playbook(), DEFAULT_PLAYBOOK.to_string()),
        (project.engine_config(), DEFAULT_ENGINE_CONFIG.to_string()),
        (project.root().join(".gitignore"), default_gitignore()),
    ] {
        if write_new(&path, &content)? {
            setup.created.push(path);
        }
    }

    setup.master_secret_created = generate_master_secret(project)?;

    tracing::info!(
        "Initialized project {:?} ({} new paths)",
        project.root(),
        setup.created.len()
    );
    Ok(setup)
}

/// Add a host under `all.hosts` in the project inventory
pub fn add_host_to_inventory(project: &Project, host: &str) -> Result<()> {
    if project.inventory_hosts()?.contains(host) {
        return Err(HkError::HostExists(host.to_string()));
    }

    let path = project.inventory();
    let text = fs::read_to_string(&path)?;
    let updated = match insert_inventory_host(&text, host) {
        Some(updated) => updated,
        None => {
            tracing::warn!("Inventory layout not recognized, rewriting {:?}", path);
            rewrite_inventory(&text, host).map_err(|source| ConfigError::Yaml {
                path: path.clone(),
                source,
            })?
        }
    };
    fs::write(&path, updated)?;
    Ok(())
}

/// Insert `host` textually at the end of the `all.hosts` block.
///
/// Keeps comments and formatting. Returns `None` when the inventory has
/// no top-level `all:` block in block style.
pub fn insert_inventory_host(inventory: &str, host: &str) -> Option<String> {
    let mut lines: Vec<String> = inventory.lines().map(String::from).collect();
    let entry = format!("    {}:", host);

    let all = lines.iter().position(|l| l.trim_end() == "all:")?;
    let in_block = |l: &str| l.trim().is_empty() || l.starts_with(' ');

    let mut hosts = None;
    let mut end = all + 1;
    while end < lines.len() && in_block(&lines[end]) {
        let line = &lines[end];
        if indent(line) == 2 {
            if let Some(rest) = line.trim().strip_prefix("hosts:") {
                if matches!(rest.trim(), "" | "{}" | "~" | "null") {
                    hosts = Some(end);
                    break;
                }
                // flow-style hosts mapping with members; not ours to edit
                return None;
            }
        }
        end += 1;
    }

    match hosts {
        Some(idx) => {
            lines[idx] = "  hosts:".to_string();
            let mut last = idx;
            let mut k = idx + 1;
            while k < lines.len() && in_block(&lines[k]) {
                if !lines[k].trim().is_empty() && indent(&lines[k]) > 2 {
                    last = k;
                } else if !lines[k].trim().is_empty() {
                    break;
                }
                k += 1;
            }
            lines.insert(last + 1, entry);
        }
        None => {
            lines.insert(all + 1, "  hosts:".to_string());
            lines.insert(all + 2, entry);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Some(out)
}

fn indent(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn rewrite_inventory(text: &str, host: &str) -> std::result::Result<String, serde_yaml::Error> {
    let mut doc: Value = serde_yaml::from_str(text)?;

    let all = ensure_mapping(&mut doc)
        .entry(Value::from(ALL_GROUP))
        .or_insert(Value::Null);
    let hosts = ensure_mapping(all)
        .entry(Value::from("hosts"))
        .or_insert(Value::Null);
    ensure_mapping(hosts).insert(Value::from(host), Value::Null);

    serde_yaml::to_string(&doc)
}

/// Borrow `value` as a mapping, replacing it with an empty one if it is not
fn ensure_mapping(value: &mut Value) -> &mut Mapping {
    if !value.is_mapping() {
        *value = Value::Mapping(Mapping::new());
    }
    match value {
        Value::Mapping(map) => map,
        _ => unreachable!("replaced with a mapping above"),
    }
}

/// Write the variables and vault files of a new host from templates.
///
/// `templates_dir` may provide `host.yml` and `host.vault.yml`; built-in
/// templates are used for whichever is absent.
pub fn write_host_files(host: &Host, templates_dir: &Path) -> Result<()> {
    fs::create_dir_all(&host.dir)?;

    let vars = load_template(templates_dir, "host.yml", DEFAULT_HOST_VARS)?;
    let vault = load_template(templates_dir, "host.vault.yml", DEFAULT_HOST_VAULT)?;

    write_new(&host.vars_file, &render_template(&vars, &host.name))?;
    write_new(&host.vault_file, &render_template(&vault, &host.name))?;
    Ok(())
}

fn load_template(dir: &Path, name: &str, fallback: &str) -> Result<String> {
    let path = dir.join(name);
    if path.is_file() {
        tracing::debug!("Using template {:?}", path);
        return Ok(fs::read_to_string(path)?);
    }
    Ok(fallback.to_string())
}

/// Substitute the host name into a template
pub fn render_template(template: &str, host: &str) -> String {
    template.replace("{{ host }}", host)
}

/// Write `content` only if `path` does not exist yet
fn write_new(path: &Path, content: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    fs::write(path, content)?;
    Ok(true)
}

const DEFAULT_INVENTORY: &str = "---
all:
  hosts:
";

const DEFAULT_PLAYBOOK: &str = "---
- name: Configure hosts
  hosts: all
  become: true
  roles: []
";

const DEFAULT_ENGINE_CONFIG: &str = "[defaults]
inventory = inventory.yml
retry_files_enabled = False
interpreter_python = auto_silent

[diff]
always = True
";

const DEFAULT_HOST_VARS: &str = "---
# Variables for {{ host }}
# ansible_user: root
# ansible_port: 22
";

const DEFAULT_HOST_VAULT: &str = "---
# Secrets for {{ host }}, encrypted at rest
vault_root_password: CHANGEME32
vault_backup_passphrase: CHANGEME48
";

fn default_gitignore() -> String {
    [
        ".venv/",
        "vendor/",
        "backups/",
        crate::project::MASTER_SECRET_FILE,
        crate::project::LOCK_FILE,
    ]
    .iter()
    .map(|l| format!("{}\n", l))
    .collect()
}
