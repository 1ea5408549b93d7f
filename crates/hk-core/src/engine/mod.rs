//! The pinned configuration-management engine
//!
//! hostkeeper drives Ansible installed into a per-project Python
//! environment. The version is pinned here; any other installed version is
//! replaced by the bootstrapper.

mod ansible;

pub use ansible::{parse_debug_output, Ansible};

/// Engine package name in the Python package index
pub const ENGINE_PACKAGE: &str = "ansible";

/// Pinned engine version
pub const ENGINE_VERSION: &str = "9.5.1";

/// Crypto dependency installed ahead of the engine
pub const CRYPTO_REQUIREMENT: &str = "cryptography==42.0.8";

/// Pinned engine requirement specifier
pub fn engine_requirement() -> String {
    format!("{}=={}", ENGINE_PACKAGE, ENGINE_VERSION)
}

/// Expression yielding the user to connect as
pub const CONNECTION_USER_EXPR: &str = "ansible_user | default('root')";

/// Expression yielding the SSH port
pub const CONNECTION_PORT_EXPR: &str = "ansible_port | default(22)";
