//! hk-core: Core library for hostkeeper
//!
//! This crate provides the project model and every component behind the
//! `hostkeeper` commands:
//! - Settings and the project/host resolver
//! - Placeholder secret generation and the vault master secret
//! - Bootstrap of the pinned engine environment
//! - The engine, transport and release seams with their system implementations

pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod interactive;
pub mod lock;
pub mod process;
pub mod project;
pub mod remote;
pub mod secrets;
pub mod setup;
pub mod traits;
pub mod updater;
pub mod vault;

pub use bootstrap::{ensure_environment, BootstrapOutcome, PipToolchain};
pub use config::{Settings, SettingsOverrides};
pub use engine::Ansible;
pub use error::{ConfigError, HkError, Result};
pub use interactive::SystemInteractive;
pub use lock::ProjectLock;
pub use project::{resolve_group, resolve_host, resolve_project, Host, Project, DEFAULT_PROJECT};
pub use remote::OpenSsh;
pub use setup::{init_project, ProjectSetup};
pub use updater::{self_upgrade, FsReplacer, GitSource, StdinConfirm, UpgradeOutcome};
