//! Host constants needed to turn raw `/proc` counters into units.

use std::num::NonZeroUsize;

/// Error raised when the host cannot report a constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    /// `sysconf` refused to answer for the named variable.
    Unavailable(&'static str),
    /// A constant was supplied as zero.
    Zero(&'static str),
}

impl std::fmt::Display for EnvironmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentError::Unavailable(name) => write!(f, "host did not report {}", name),
            EnvironmentError::Zero(name) => write!(f, "{} must be positive", name),
        }
    }
}

impl std::error::Error for EnvironmentError {}

/// Immutable host constants, queried once at startup and passed by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    ticks_per_second: u64,
    page_size_bytes: u64,
    cpu_count: u64,
}

impl HostConfig {
    /// Builds a configuration from explicit values.
    pub fn new(
        ticks_per_second: u64,
        page_size_bytes: u64,
        cpu_count: u64,
    ) -> Result<Self, EnvironmentError> {
        if ticks_per_second == 0 {
            return Err(EnvironmentError::Zero("ticks per second"));
        }
        if page_size_bytes == 0 {
            return Err(EnvironmentError::Zero("page size"));
        }
        if cpu_count == 0 {
            return Err(EnvironmentError::Zero("cpu count"));
        }
        Ok(Self {
            ticks_per_second,
            page_size_bytes,
            cpu_count,
        })
    }

    /// Queries the running host.
    ///
    /// Clock ticks and page size come from `sysconf`; a failure there is
    /// unrecoverable. The CPU count falls back to 1 when unknown, since it
    /// only matters for per-core normalization.
    pub fn initialize() -> Result<Self, EnvironmentError> {
        let ticks = sysconf(libc::_SC_CLK_TCK, "_SC_CLK_TCK")?;
        let page_size = sysconf(libc::_SC_PAGESIZE, "_SC_PAGESIZE")?;
        let cpus = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::new(ticks, page_size, cpus as u64)
    }

    /// Returns the configuration snapshot.
    pub fn current(&self) -> HostConfig {
        *self
    }

    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    pub fn page_size_bytes(&self) -> u64 {
        self.page_size_bytes
    }

    pub fn cpu_count(&self) -> u64 {
        self.cpu_count
    }
}

fn sysconf(name: libc::c_int, label: &'static str) -> Result<u64, EnvironmentError> {
    // SAFETY: sysconf has no preconditions and only reads system configuration.
    let result = unsafe { libc::sysconf(name) };
    if result <= 0 {
        return Err(EnvironmentError::Unavailable(label));
    }
    Ok(result as u64)
}
