//! hostkeeper: command-line interface
//!
//! Turns a parsed command line into a dispatcher request and reports the
//! outcome on the terminal.

pub mod commands;
pub mod output;
