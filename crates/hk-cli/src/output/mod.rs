//! Output formatting utilities for the CLI
//!
//! Every operator-facing line carries the `[hostkeeper]` tag so it stands
//! apart from the engine's own output, which is passed through untouched.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{settings::Style, Table, Tabled};

/// Tag printed in front of every message
pub const TAG: &str = "[hostkeeper]";

static QUIET: AtomicBool = AtomicBool::new(false);

/// Silence success, info and warning messages; errors are always printed
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// A role shipping a defaults file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub name: String,
    pub defaults: String,
}

/// Format the roles available to `show-defaults` as a table
pub fn format_roles(roles: &[RoleInfo]) -> String {
    if roles.is_empty() {
        return "No roles with defaults found".to_string();
    }

    #[derive(Tabled)]
    struct RoleRow {
        #[tabled(rename = "ROLE")]
        name: String,
        #[tabled(rename = "DEFAULTS")]
        defaults: String,
    }

    let rows: Vec<RoleRow> = roles
        .iter()
        .map(|r| RoleRow {
            name: r.name.clone(),
            defaults: r.defaults.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a list of created paths relative to `root`
pub fn format_created(root: &Path, paths: &[std::path::PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            let shown = p.strip_prefix(root).unwrap_or(p);
            if shown.as_os_str().is_empty() {
                format!("  {}/", root.display())
            } else {
                format!("  {}", shown.display())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print a success message in green
pub fn print_success(msg: &str) {
    if is_quiet() {
        return;
    }
    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print(TAG),
        ResetColor,
        Print(" "),
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red on stderr
pub fn print_error(msg: &str) {
    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print(TAG),
        Print(" ERROR:"),
        ResetColor,
        Print(" "),
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow on stderr
pub fn print_warning(msg: &str) {
    if is_quiet() {
        return;
    }
    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print(TAG),
        Print(" WARNING:"),
        ResetColor,
        Print(" "),
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    if is_quiet() {
        return;
    }
    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print(TAG),
        ResetColor,
        Print(" "),
        Print(msg),
        Print("\n")
    );
}
