//! Operator settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{default_cache_dir, default_config_path, load_config};
use crate::error::ConfigError;

/// Settings shared by every command of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one subdirectory per project
    pub projects_root: PathBuf,

    /// Local checkout of the hostkeeper source (roles, templates, releases)
    pub cache_dir: PathBuf,

    /// Editor command, may carry arguments (e.g. "code -w")
    pub editor: String,

    /// Pager command
    pub pager: String,

    /// Python interpreter used to create project environments
    pub python: String,

    /// Canonical git location of the hostkeeper source
    pub source_url: String,

    /// Branch followed by upgrade and self-upgrade
    pub release_channel: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            projects_root: PathBuf::from("."),
            cache_dir: default_cache_dir(),
            editor: "vi".to_string(),
            pager: "less".to_string(),
            python: "python3".to_string(),
            source_url: "https://github.com/hostkeeper/hostkeeper.git".to_string(),
            release_channel: "stable".to_string(),
        }
    }
}

/// Values taken from flags and environment variables; `None` keeps the file value
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub projects_root: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub editor: Option<String>,
    pub pager: Option<String>,
    pub python: Option<String>,
    pub source_url: Option<String>,
    pub release_channel: Option<String>,
}

impl Settings {
    /// Load settings from `path`, or from the default location when present.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => load_config(path),
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    load_config(&default_path)
                } else {
                    tracing::debug!("No config file at {:?}, using defaults", default_path);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply flag/environment overrides on top of the loaded values
    pub fn with_overrides(mut self, overrides: SettingsOverrides) -> Self {
        if let Some(v) = overrides.projects_root {
            self.projects_root = v;
        }
        if let Some(v) = overrides.cache_dir {
            self.cache_dir = v;
        }
        if let Some(v) = overrides.editor.filter(|v| !v.trim().is_empty()) {
            self.editor = v;
        }
        if let Some(v) = overrides.pager.filter(|v| !v.trim().is_empty()) {
            self.pager = v;
        }
        if let Some(v) = overrides.python {
            self.python = v;
        }
        if let Some(v) = overrides.source_url {
            self.source_url = v;
        }
        if let Some(v) = overrides.release_channel {
            self.release_channel = v;
        }
        self
    }

    /// Role definitions shipped with the source checkout
    pub fn roles_dir(&self) -> PathBuf {
        self.cache_dir.join("roles")
    }

    /// Host file templates shipped with the source checkout
    pub fn templates_dir(&self) -> PathBuf {
        self.cache_dir.join("templates")
    }

    /// Galaxy requirements for vendored dependencies
    pub fn requirements_file(&self) -> PathBuf {
        self.cache_dir.join("requirements.yml")
    }
}
