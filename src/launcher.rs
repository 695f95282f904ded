//! Starting the monitored program.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};

use tracing::{debug, info};

/// Error type for launch failures.
#[derive(Debug)]
pub struct LaunchError {
    pub program: PathBuf,
    pub source: io::Error,
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to execute {}: {}", self.program.display(), self.source)
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// A spawned child process.
///
/// The child inherits stdio. Exit is detected by [`ChildProcess::try_exit_status`],
/// which also reaps the child; until that happens an exited child stays a
/// zombie whose `/proc/[pid]/stat` is still readable.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    exit_status: Option<ExitStatus>,
}

impl ChildProcess {
    /// Spawns `program` with `args`.
    pub fn spawn(program: impl AsRef<Path>, args: &[OsString]) -> Result<Self, LaunchError> {
        let program = program.as_ref();
        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|source| LaunchError {
                program: program.to_path_buf(),
                source,
            })?;
        info!("Started {} as pid {}", program.display(), child.id());
        Ok(Self {
            child,
            exit_status: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Returns the exit status if the child has exited, reaping it.
    pub fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.exit_status.is_none() {
            self.exit_status = self.child.try_wait()?;
        }
        Ok(self.exit_status)
    }

    /// Kills the child if it is still running and waits for it.
    pub fn kill(&mut self) -> io::Result<()> {
        if self.try_exit_status()?.is_some() {
            return Ok(());
        }
        debug!("Killing pid {}", self.pid());
        self.child.kill()?;
        self.exit_status = Some(self.child.wait()?);
        Ok(())
    }
}
