//! Command dispatcher
//!
//! Each invocation becomes one [`Request`]. The request's [`Action`] selects
//! an ordered list of pre-steps ([`plan`]) whose results form the immutable
//! [`Context`] handed to exactly one handler.

mod deploy;
mod project;
mod remote;
mod self_upgrade;

use std::fmt;
use std::sync::Arc;

use hk_core::bootstrap::{ensure_environment, BootstrapOutcome, PipToolchain};
use hk_core::traits::{
    ConfigEngine, Confirm, Interactive, RemoteTransport, Replacer, RunMode, SourceRepo, Toolchain,
};
use hk_core::{
    resolve_group, resolve_host, resolve_project, Ansible, FsReplacer, GitSource, HkError, Host,
    OpenSsh, Project, ProjectLock, Result, Settings, StdinConfirm, SystemInteractive,
    DEFAULT_PROJECT,
};

use crate::output::print_info;

/// Terminal actions, one per command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    InitProject,
    InitHost,
    Deploy,
    Check,
    EditPlaybook,
    EditInventory,
    EditHost,
    EditGroup,
    EditVault,
    Shell,
    Logs,
    Ls,
    FetchBackups,
    Upgrade,
    ShowDefaults,
    SelfUpgrade,
    Help,
}

impl Action {
    /// Command name as typed on the command line
    pub fn name(self) -> &'static str {
        match self {
            Action::InitProject => "init-project",
            Action::InitHost => "init-host",
            Action::Deploy => "deploy",
            Action::Check => "check",
            Action::EditPlaybook => "edit-playbook",
            Action::EditInventory => "edit-inventory",
            Action::EditHost => "edit-host",
            Action::EditGroup => "edit-group",
            Action::EditVault => "edit-vault",
            Action::Shell => "shell",
            Action::Logs => "logs",
            Action::Ls => "ls",
            Action::FetchBackups => "fetch-backups",
            Action::Upgrade => "upgrade",
            Action::ShowDefaults => "show-defaults",
            Action::SelfUpgrade => "self-upgrade",
            Action::Help => "help",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared pre-steps run before a terminal action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ProjectExists,
    Lock,
    Bootstrap,
    ResolveHost,
    ResolveGroup,
}

/// Everything an invocation asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub action: Action,
    pub project: String,
    pub host: Option<String>,
    pub group: Option<String>,
    pub role: Option<String>,
    /// Remote path for `ls`
    pub path: String,
    pub tags: Vec<String>,
    /// Run against every host instead of one
    pub all: bool,
}

impl Request {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            project: DEFAULT_PROJECT.to_string(),
            host: None,
            group: None,
            role: None,
            path: ".".to_string(),
            tags: Vec::new(),
            all: false,
        }
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn host(mut self, host: Option<String>) -> Self {
        self.host = host.filter(|h| !h.is_empty());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.action == Action::InitHost && self.host.is_none() {
            return Err(HkError::HostRequired);
        }
        Ok(())
    }
}

/// Pre-steps of a request, in execution order
pub fn plan(request: &Request) -> Vec<Step> {
    use Step::*;

    match request.action {
        Action::InitProject | Action::ShowDefaults | Action::SelfUpgrade | Action::Help => vec![],
        Action::InitHost | Action::Upgrade => vec![ProjectExists, Lock, Bootstrap],
        Action::Deploy | Action::Check if request.all => vec![ProjectExists, Lock, Bootstrap],
        Action::Deploy | Action::Check => vec![ProjectExists, Lock, Bootstrap, ResolveHost],
        Action::EditPlaybook | Action::EditInventory => vec![ProjectExists, Lock],
        Action::EditHost => vec![ProjectExists, Lock, ResolveHost],
        Action::EditGroup => vec![ProjectExists, Lock, ResolveGroup],
        Action::EditVault | Action::FetchBackups => {
            vec![ProjectExists, Lock, Bootstrap, ResolveHost]
        }
        // read-only sessions never take the lock
        Action::Shell | Action::Logs | Action::Ls => vec![ProjectExists, Bootstrap, ResolveHost],
    }
}

/// What the pre-steps resolved, read by every handler
#[derive(Debug)]
pub struct Context<'a> {
    pub settings: &'a Settings,
    pub request: &'a Request,
    project: Option<Project>,
    host: Option<Host>,
    group: Option<String>,
}

impl Context<'_> {
    pub fn project(&self) -> Result<&Project> {
        self.project.as_ref().ok_or_else(|| HkError::ProjectNotFound {
            name: self.request.project.clone(),
            path: self.settings.projects_root.join(&self.request.project),
        })
    }

    pub fn host(&self) -> Result<&Host> {
        self.host.as_ref().ok_or(HkError::HostRequired)
    }

    pub fn group(&self) -> &str {
        self.group.as_deref().unwrap_or(hk_core::project::ALL_GROUP)
    }
}

/// External tools used by the handlers
pub struct Services {
    pub engine: Arc<dyn ConfigEngine>,
    pub toolchain: Arc<dyn Toolchain>,
    pub transport: Arc<dyn RemoteTransport>,
    pub interactive: Arc<dyn Interactive>,
    pub source: Arc<dyn SourceRepo>,
    pub confirm: Arc<dyn Confirm>,
    pub replacer: Arc<dyn Replacer>,
}

impl Services {
    /// Implementations that shell out to the real tools
    pub fn system(settings: &Settings) -> Self {
        Self {
            engine: Arc::new(Ansible::new(settings)),
            toolchain: Arc::new(PipToolchain::new(settings.python.clone())),
            transport: Arc::new(OpenSsh),
            interactive: Arc::new(SystemInteractive::new(settings)),
            source: Arc::new(GitSource),
            confirm: Arc::new(StdinConfirm),
            replacer: Arc::new(FsReplacer),
        }
    }
}

/// How a successful invocation ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exit 0
    Done,
    /// Exit with a code reported by the engine
    Exit(i32),
    /// Print the full usage and exit 0
    Usage,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Done | Outcome::Usage => 0,
            Outcome::Exit(code) => code,
        }
    }
}

/// Run the plan of `request` and then its terminal action
pub async fn dispatch(request: &Request, settings: &Settings, services: &Services) -> Result<Outcome> {
    request.validate()?;

    let mut project = None;
    let mut host = None;
    let mut group = None;
    // held until the action finishes; released on drop
    let mut _lock = None;

    for step in plan(request) {
        tracing::debug!("{}: {:?}", request.action, step);
        match step {
            Step::ProjectExists => {
                let resolved = resolve_project(settings, &request.project)?;
                if matches!(request.action, Action::Deploy | Action::Check) {
                    resolved.require_files()?;
                }
                project = Some(resolved);
            }
            Step::Lock => {
                if let Some(project) = &project {
                    _lock = Some(ProjectLock::acquire(project, std::process::id())?);
                }
            }
            Step::Bootstrap => {
                if let Some(project) = &project {
                    if ensure_environment(services.toolchain.as_ref(), project).await?
                        == BootstrapOutcome::Recreated
                    {
                        print_info(&format!(
                            "Installed the pinned engine into {}",
                            project.venv_dir().display()
                        ));
                    }
                }
            }
            Step::ResolveHost => {
                if let Some(project) = &project {
                    host = Some(resolve_host(project, request.host.as_deref())?);
                }
            }
            Step::ResolveGroup => {
                group = Some(resolve_group(request.group.as_deref())?);
            }
        }
    }

    let ctx = Context {
        settings,
        request,
        project,
        host,
        group,
    };

    match request.action {
        Action::InitProject => project::init_project(&ctx),
        Action::InitHost => project::init_host(&ctx, services).await,
        Action::Deploy => deploy::run(&ctx, services, RunMode::Apply).await,
        Action::Check => deploy::run(&ctx, services, RunMode::Check).await,
        Action::EditPlaybook => project::edit_playbook(&ctx, services).await,
        Action::EditInventory => project::edit_inventory(&ctx, services).await,
        Action::EditHost => project::edit_host(&ctx, services).await,
        Action::EditGroup => project::edit_group(&ctx, services).await,
        Action::EditVault => project::edit_vault(&ctx, services).await,
        Action::Shell => remote::shell(&ctx, services).await,
        Action::Logs => remote::logs(&ctx, services).await,
        Action::Ls => remote::ls(&ctx, services).await,
        Action::FetchBackups => remote::fetch_backups(&ctx, services).await,
        Action::Upgrade => project::upgrade(&ctx, services).await,
        Action::ShowDefaults => project::show_defaults(&ctx, services).await,
        Action::SelfUpgrade => self_upgrade::run(&ctx, services).await,
        Action::Help => Ok(Outcome::Usage),
    }
}
