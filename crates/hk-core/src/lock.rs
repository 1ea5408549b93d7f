//! Project lock file
//!
//! A PID file inside the project directory serializes invocations that
//! mutate the project. The PID is written to a staging file first and
//! hard-linked into place, so the lock never exists without its contents.
//! A lock left behind by a dead process is reclaimed.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HkError, Result};
use crate::project::Project;

/// Age below which an unreadable lock is still considered held
pub const LOCK_GRACE: Duration = Duration::from_secs(5);

/// Read the PID from a lock file
///
/// Returns `Ok(Some(pid))` if the file exists and contains a valid PID,
/// `Ok(None)` if the file doesn't exist, or an error if the file is malformed.
pub fn read_pid_file(path: &Path) -> io::Result<Option<u32>> {
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let pid = contents
                .trim()
                .parse::<u32>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(pid))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove a lock file
///
/// Returns `Ok(())` even if the file doesn't exist.
pub fn remove_pid_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Check if a process with the given PID is still alive
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // 0 and values past pid_t would address process groups, not a process
    let pid = match libc::pid_t::try_from(pid) {
        Ok(pid) if pid > 0 => pid,
        _ => return false,
    };
    // kill(pid, 0) probes without signalling; EPERM means it exists but isn't ours
    unsafe {
        let result = libc::kill(pid, 0);
        if result == 0 {
            return true;
        }
        let err = std::io::Error::last_os_error();
        err.raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    // cannot probe; treat every recorded holder as alive
    true
}

/// State of an existing lock file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Holder {
    /// Held by a live process; 0 when the PID is not readable yet
    Live(u32),
    Stale,
    Gone,
}

/// Exclusive lock on a project, released on drop
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    /// Take the lock for `project` on behalf of process `pid`
    pub fn acquire(project: &Project, pid: u32) -> Result<Self> {
        let path = project.lock_file();
        let staged = sibling(&path, &format!("{}.tmp", pid));

        let mut file = fs::File::create(&staged)?;
        writeln!(file, "{}", pid)?;
        file.sync_all()?;
        drop(file);

        let result = Self::link(path, &staged, pid);
        if let Err(e) = remove_pid_file(&staged) {
            tracing::warn!("Failed to remove {:?}: {}", staged, e);
        }
        result
    }

    fn link(path: PathBuf, staged: &Path, pid: u32) -> Result<Self> {
        // a second attempt is made only after reclaiming a stale lock
        for _ in 0..2 {
            match fs::hard_link(staged, &path) {
                Ok(()) => {
                    tracing::debug!("Locked {:?}", path);
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    match holder(&path, pid)? {
                        Holder::Live(holder) => {
                            return Err(HkError::ProjectLocked { pid: holder, path });
                        }
                        Holder::Stale => reclaim(&path, pid)?,
                        Holder::Gone => {}
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        let holder = read_pid_file(&path).ok().flatten().unwrap_or_default();
        Err(HkError::ProjectLocked { pid: holder, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if let Err(e) = remove_pid_file(&self.path) {
            tracing::warn!("Failed to remove lock file {:?}: {}", self.path, e);
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn holder(path: &Path, pid: u32) -> Result<Holder> {
    match read_pid_file(path) {
        Ok(None) => Ok(Holder::Gone),
        Ok(Some(holder)) if holder != pid && is_process_alive(holder) => Ok(Holder::Live(holder)),
        Ok(Some(_)) => Ok(Holder::Stale),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            if is_fresh(path) {
                Ok(Holder::Live(0))
            } else {
                Ok(Holder::Stale)
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether `path` was modified within [`LOCK_GRACE`]
fn is_fresh(path: &Path) -> bool {
    match fs::metadata(path).and_then(|m| m.modified()) {
        // a timestamp in the future counts as fresh
        Ok(modified) => modified.elapsed().map_or(true, |age| age < LOCK_GRACE),
        Err(_) => false,
    }
}

/// Move a stale lock aside and delete it.
///
/// Another invocation may have replaced the lock since it was judged
/// stale; a live lock moved aside by mistake is linked back.
fn reclaim(path: &Path, pid: u32) -> Result<()> {
    let aside = sibling(path, &format!("{}.stale", pid));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    if let Holder::Live(holder) = holder(&aside, pid)? {
        tracing::debug!("Lock {:?} was taken over by {}, restoring", path, holder);
        if let Err(e) = fs::hard_link(&aside, path) {
            tracing::debug!("Lock {:?} not restored: {}", path, e);
        }
    } else {
        tracing::warn!("Removing stale lock {:?}", path);
    }
    remove_pid_file(&aside)?;
    Ok(())
}
