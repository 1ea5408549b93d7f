//! Seams between hostkeeper and the external tools it drives
//!
//! Each trait has one production implementation that shells out, and the
//! test suites substitute fakes.

mod engine;
mod interactive;
mod release;
mod toolchain;
mod transport;

pub use engine::{ConfigEngine, PlaybookOptions, RunMode, VaultOp};
pub use interactive::Interactive;
pub use release::{Confirm, Replacer, SourceRepo};
pub use toolchain::Toolchain;
pub use transport::{Connection, RemoteTransport};
