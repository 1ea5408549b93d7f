//! hostkeeper CLI
//!
//! Single binary managing Ansible deployment projects:
//! - Project and host lifecycle (init, edit, vault)
//! - Playbook runs (deploy, check)
//! - Remote sessions (shell, logs, ls, fetch-backups)
//! - Upgrades of project dependencies and of hostkeeper itself

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hk_core::{HkError, Settings, SettingsOverrides, DEFAULT_PROJECT};
use hostkeeper::commands::{dispatch, Action, Outcome, Request, Services};
use hostkeeper::output::{print_error, set_quiet};

#[derive(Parser)]
#[command(name = "hostkeeper")]
#[command(
    author,
    version,
    about = "Lifecycle manager for Ansible deployment projects and their hosts"
)]
#[command(propagate_version = true, disable_help_subcommand = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    env: EnvArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Settings that may also come from the environment
#[derive(Args)]
struct EnvArgs {
    /// Directory holding the projects
    #[arg(long, env = "HOSTKEEPER_PROJECTS", global = true, value_name = "DIR")]
    projects: Option<PathBuf>,

    /// Local checkout of the hostkeeper source
    #[arg(long, env = "HOSTKEEPER_CACHE", global = true, value_name = "DIR")]
    cache: Option<PathBuf>,

    /// Editor command
    #[arg(long, env = "EDITOR", global = true, hide_env_values = true)]
    editor: Option<String>,

    /// Pager command
    #[arg(long, env = "PAGER", global = true, hide_env_values = true)]
    pager: Option<String>,

    /// Python interpreter for project environments
    #[arg(long, env = "HOSTKEEPER_PYTHON", global = true, hide = true)]
    python: Option<String>,

    /// Git URL of the hostkeeper source
    #[arg(long, env = "HOSTKEEPER_SOURCE", global = true, hide = true)]
    source: Option<String>,

    /// Release branch followed by upgrades
    #[arg(long, env = "HOSTKEEPER_CHANNEL", global = true, hide = true)]
    channel: Option<String>,
}

#[derive(Args)]
struct ProjectArg {
    /// Project name
    #[arg(default_value = DEFAULT_PROJECT)]
    project: String,
}

#[derive(Args)]
struct Target {
    /// Project name
    #[arg(default_value = DEFAULT_PROJECT)]
    project: String,

    /// Host name (defaults to the only host of the project)
    host: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    target: Target,

    /// Only run tasks with these tags (comma-separated)
    #[arg(long, env = "TAGS", value_delimiter = ',')]
    tags: Vec<String>,

    /// Run against every host of the project
    #[arg(long)]
    all: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project with an empty inventory, a playbook and a vault master secret
    InitProject(ProjectArg),

    /// Add a host to a project and generate its encrypted secrets
    InitHost(Target),

    /// Apply the playbook to a host
    Deploy(RunArgs),

    /// Dry-run the playbook against a host and show the diff
    Check(RunArgs),

    /// Edit the project playbook
    EditPlaybook(ProjectArg),

    /// Edit the project inventory
    EditInventory(ProjectArg),

    /// Edit the variables of a host
    EditHost(Target),

    /// Edit the variables of a group (default: all)
    EditGroup {
        /// Project name
        #[arg(default_value = DEFAULT_PROJECT)]
        project: String,
        /// Group name
        group: Option<String>,
    },

    /// Edit the encrypted secrets of a host
    EditVault(Target),

    /// Open a shell on a host
    Shell(Target),

    /// Follow the system log of a host
    Logs(Target),

    /// List a directory on a host
    ///
    /// A second argument containing a slash, or starting with `.` or `~`,
    /// is taken as the path and the only host of the project is used.
    Ls {
        #[command(flatten)]
        target: Target,
        /// Remote path (default: the login directory)
        path: Option<String>,
    },

    /// Copy the backups of a host into the project
    FetchBackups(Target),

    /// Update the source checkout and reinstall project dependencies
    Upgrade(ProjectArg),

    /// Show the default variables of a role, or list the roles
    ShowDefaults {
        /// Role name
        role: Option<String>,
    },

    /// Replace this executable with the latest release
    SelfUpgrade,

    /// Print this help
    Help,
}

impl Commands {
    fn into_request(self) -> Request {
        match self {
            Commands::InitProject(p) => Request::new(Action::InitProject).project(p.project),
            Commands::InitHost(t) => for_target(Action::InitHost, t),
            Commands::Deploy(r) => for_run(Action::Deploy, r),
            Commands::Check(r) => for_run(Action::Check, r),
            Commands::EditPlaybook(p) => Request::new(Action::EditPlaybook).project(p.project),
            Commands::EditInventory(p) => Request::new(Action::EditInventory).project(p.project),
            Commands::EditHost(t) => for_target(Action::EditHost, t),
            Commands::EditGroup { project, group } => Request {
                group,
                ..Request::new(Action::EditGroup).project(project)
            },
            Commands::EditVault(t) => for_target(Action::EditVault, t),
            Commands::Shell(t) => for_target(Action::Shell, t),
            Commands::Logs(t) => for_target(Action::Logs, t),
            Commands::Ls { target, path } => ls_request(target, path),
            Commands::FetchBackups(t) => for_target(Action::FetchBackups, t),
            Commands::Upgrade(p) => Request::new(Action::Upgrade).project(p.project),
            Commands::ShowDefaults { role } => Request {
                role,
                ..Request::new(Action::ShowDefaults)
            },
            Commands::SelfUpgrade => Request::new(Action::SelfUpgrade),
            Commands::Help => Request::new(Action::Help),
        }
    }
}

fn for_target(action: Action, target: Target) -> Request {
    Request::new(action)
        .project(target.project)
        .host(target.host)
}

/// `ls infra /etc` names a path, not a host
fn ls_request(mut target: Target, mut path: Option<String>) -> Request {
    if path.is_none() && target.host.as_deref().is_some_and(looks_like_path) {
        path = target.host.take();
    }
    let request = for_target(Action::Ls, target);
    match path {
        Some(path) => Request { path, ..request },
        None => request,
    }
}

fn looks_like_path(arg: &str) -> bool {
    arg.contains('/') || arg.starts_with('.') || arg.starts_with('~')
}

fn for_run(action: Action, args: RunArgs) -> Request {
    Request {
        tags: args.tags,
        all: args.all,
        ..for_target(action, args.target)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => std::process::exit(report_parse_error(e)),
    };

    set_quiet(cli.quiet);

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let Some(command) = cli.command else {
        print_error(&HkError::MissingCommand.to_string());
        eprintln!("{}", Cli::command().render_help());
        return Ok(1);
    };

    let settings = Settings::load(cli.config.as_deref())
        .context("failed to load settings")?
        .with_overrides(SettingsOverrides {
            projects_root: cli.env.projects,
            cache_dir: cli.env.cache,
            editor: cli.env.editor,
            pager: cli.env.pager,
            python: cli.env.python,
            source_url: cli.env.source,
            release_channel: cli.env.channel,
        });
    tracing::debug!("Settings: {:?}", settings);

    let request = command.into_request();
    let services = Services::system(&settings);

    let outcome = dispatch(&request, &settings, &services).await?;
    if outcome == Outcome::Usage {
        println!("{}", Cli::command().render_long_help());
    }
    Ok(outcome.exit_code())
}

/// Print a command-line parse error and return the exit code
fn report_parse_error(e: clap::Error) -> i32 {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = e.print();
            0
        }
        ErrorKind::InvalidSubcommand => {
            let name = match e.get(ContextKind::InvalidSubcommand) {
                Some(ContextValue::String(name)) => name.clone(),
                _ => String::new(),
            };
            print_error(&HkError::UnknownCommand(name).to_string());
            eprintln!("{}", Cli::command().render_usage());
            1
        }
        _ => {
            let _ = e.print();
            1
        }
    }
}
