//! Open file descriptor counting from `/proc/[pid]/fd`.

use crate::collector::traits::FileSystem;
use std::path::PathBuf;

/// Error type for fd enumeration failures.
#[derive(Debug)]
pub enum FdError {
    /// The process directory is gone.
    ProcessGone(u32),
    /// The process exists but its fd directory cannot be listed.
    Unreadable { pid: u32, source: std::io::Error },
}

impl std::fmt::Display for FdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FdError::ProcessGone(pid) => write!(f, "process {} disappeared", pid),
            FdError::Unreadable { pid, source } => {
                write!(f, "cannot list fds of process {}: {}", pid, source)
            }
        }
    }
}

impl std::error::Error for FdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FdError::ProcessGone(_) => None,
            FdError::Unreadable { source, .. } => Some(source),
        }
    }
}

/// Counts the entries of `/proc/[pid]/fd`.
pub struct FdCounter<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl<F: FileSystem> FdCounter<F> {
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    /// Returns the number of file descriptors `pid` currently holds open.
    pub fn count(&self, pid: u32) -> Result<usize, FdError> {
        let proc_dir = self.proc_path.join(pid.to_string());
        match self.fs.read_dir(&proc_dir.join("fd")) {
            Ok(entries) => Ok(entries.len()),
            // A missing process directory means the process is gone. Anything
            // else (usually EACCES on another user's process) is an fd-only
            // problem.
            Err(_) if !self.fs.exists(&proc_dir) => Err(FdError::ProcessGone(pid)),
            Err(source) => Err(FdError::Unreadable { pid, source }),
        }
    }
}
