//! Incremental resource sampling of one tracked process.
//!
//! A `ProcessSampler` keeps the last successfully read accounting snapshot and
//! the monotonic instant it was taken. Each `sample()` reads a new snapshot,
//! turns the tick delta over the measured interval into a CPU percentage and
//! only then replaces the baseline. A failed sample leaves the baseline alone,
//! so the next success still covers a contiguous interval.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{trace, warn};

use crate::collector::host::HostConfig;
use crate::collector::procfs::{FdCounter, ParseError, ProcessSample, StatFields, parse_proc_stat};
use crate::collector::traits::{Clock, FileSystem};

/// How the CPU percentage is scaled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CpuScale {
    /// 100% is one fully busy core; a multi-threaded process can exceed it.
    #[default]
    SingleCore,
    /// 100% is every core of the host fully busy.
    PerCore,
}

/// Resource usage of the tracked process over one sampling interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stat {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub open_fds: usize,
    /// The fd count could not be read this interval and was carried over
    /// (or defaulted to zero).
    pub fds_stale: bool,
}

/// Error type for sampling failures.
#[derive(Debug)]
pub enum SampleError {
    /// The process stat file does not exist any more; the process is gone.
    ProcessUnavailable(u32),
    /// The process stat file exists but reading it failed.
    Unreadable { pid: u32, source: io::Error },
    /// The stat line was malformed.
    Parse(ParseError),
    /// No time passed since the baseline was taken.
    ZeroInterval,
    /// CPU counters went backwards, so the pid no longer names the same process.
    CounterRegression { previous: u64, current: u64 },
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::ProcessUnavailable(pid) => write!(f, "process {} is not available", pid),
            SampleError::Unreadable { pid, source } => {
                write!(f, "cannot read stat of process {}: {}", pid, source)
            }
            SampleError::Parse(e) => write!(f, "{}", e),
            SampleError::ZeroInterval => write!(f, "no time elapsed since the previous sample"),
            SampleError::CounterRegression { previous, current } => write!(
                f,
                "cpu ticks went backwards from {} to {}",
                previous, current
            ),
        }
    }
}

impl std::error::Error for SampleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SampleError::Parse(e) => Some(e),
            SampleError::Unreadable { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ParseError> for SampleError {
    fn from(e: ParseError) -> Self {
        SampleError::Parse(e)
    }
}

/// Samples CPU, memory and fd usage of a single process.
pub struct ProcessSampler<F: FileSystem + Clone, C: Clock> {
    fs: F,
    clock: C,
    fd_counter: FdCounter<F>,
    host: HostConfig,
    scale: CpuScale,
    pid: u32,
    stat_path: PathBuf,
    previous: ProcessSample,
    previous_at: Instant,
    last_open_fds: Option<usize>,
}

impl<F: FileSystem + Clone, C: Clock> ProcessSampler<F, C> {
    /// Creates a sampler for `pid` and reads its baseline immediately.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `clock` - Monotonic time source
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    /// * `pid` - Process to track
    /// * `host` - Host constants used for unit conversion
    pub fn new(
        fs: F,
        clock: C,
        proc_path: impl AsRef<Path>,
        pid: u32,
        host: HostConfig,
    ) -> Result<Self, SampleError> {
        let proc_path = proc_path.as_ref();
        let stat_path = proc_path.join(pid.to_string()).join("stat");
        let fd_counter = FdCounter::new(fs.clone(), proc_path);

        let previous_at = clock.now();
        let previous = read_sample(&fs, &stat_path, pid)?;
        let last_open_fds = fd_counter.count(pid).ok();

        Ok(Self {
            fs,
            clock,
            fd_counter,
            host,
            scale: CpuScale::default(),
            pid,
            stat_path,
            previous,
            previous_at,
            last_open_fds,
        })
    }

    /// Sets how CPU percentages are scaled.
    pub fn with_cpu_scale(mut self, scale: CpuScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the snapshot the next sample will be measured against.
    pub fn baseline(&self) -> &ProcessSample {
        &self.previous
    }

    /// Takes a new sample and advances the baseline.
    ///
    /// On error the baseline is left untouched.
    pub fn sample(&mut self) -> Result<Stat, SampleError> {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(self.previous_at);

        let current = read_sample(&self.fs, &self.stat_path, self.pid)?;

        let (previous_ticks, current_ticks) = (self.previous.total_ticks(), current.total_ticks());
        let ticks_delta = current_ticks.checked_sub(previous_ticks).ok_or(
            SampleError::CounterRegression {
                previous: previous_ticks,
                current: current_ticks,
            },
        )?;

        let cpu_percent = self.cpu_percent(ticks_delta, elapsed)?;
        let memory_bytes = current
            .resident_pages
            .saturating_mul(self.host.page_size_bytes());

        let (open_fds, fds_stale) = match self.fd_counter.count(self.pid) {
            Ok(count) => (count, false),
            Err(e) => {
                let fallback = self.last_open_fds.unwrap_or(0);
                warn!("fd count unavailable, reusing {}: {}", fallback, e);
                (fallback, true)
            }
        };

        trace!(
            pid = self.pid,
            ticks_delta,
            elapsed_ms = elapsed.as_millis() as u64,
            "sampled"
        );

        self.previous = current;
        self.previous_at = now;
        if !fds_stale {
            self.last_open_fds = Some(open_fds);
        }

        Ok(Stat {
            cpu_percent,
            memory_bytes,
            open_fds,
            fds_stale,
        })
    }

    fn cpu_percent(&self, ticks_delta: u64, elapsed: Duration) -> Result<f64, SampleError> {
        if elapsed.is_zero() {
            return Err(SampleError::ZeroInterval);
        }
        let tick_capacity = elapsed.as_secs_f64() * self.host.ticks_per_second() as f64;
        let percent = ticks_delta as f64 * 100.0 / tick_capacity;
        Ok(match self.scale {
            CpuScale::SingleCore => percent,
            CpuScale::PerCore => percent / self.host.cpu_count() as f64,
        })
    }
}

fn read_sample<F: FileSystem>(fs: &F, path: &Path, pid: u32) -> Result<ProcessSample, SampleError> {
    let raw = fs.read(path).map_err(|source| {
        if process_is_gone(&source) {
            SampleError::ProcessUnavailable(pid)
        } else {
            SampleError::Unreadable { pid, source }
        }
    })?;
    // comm is copied from the executable name and truncated to 15 bytes, so it
    // may end mid-character. Only the numeric fields after it are used.
    let content = String::from_utf8_lossy(&raw);
    Ok(parse_proc_stat(&content, &StatFields::KERNEL)?)
}

/// `ENOENT` before the open, `ESRCH` when the process exits between the open
/// and the read.
fn process_is_gone(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ESRCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockFs, stat_line};
    use crate::collector::traits::ManualClock;
    use std::sync::Arc;

    const PID: u32 = 4242;

    fn host() -> HostConfig {
        HostConfig::new(100, 4096, 4).unwrap()
    }

    fn sampler(fs: &MockFs, clock: &Arc<ManualClock>) -> ProcessSampler<MockFs, Arc<ManualClock>> {
        ProcessSampler::new(fs.clone(), Arc::clone(clock), "/proc", PID, host()).unwrap()
    }

    fn set_ticks(fs: &MockFs, utime: u64, stime: u64, rss: i64) {
        fs.set_stat(PID, &stat_line(PID, "worker", utime, stime, rss));
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_cpu_percent_over_measured_interval() {
        let fs = MockFs::tracked_process(PID, 100, 50, 1000, 3);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_secs(2));
        set_ticks(&fs, 150, 80, 1000);

        let stat = sampler.sample().unwrap();
        assert_close(stat.cpu_percent, 40.0);
        assert_eq!(stat.memory_bytes, 4_096_000);
        assert_eq!(stat.open_fds, 3);
        assert!(!stat.fds_stale);
    }

    #[test]
    fn test_idle_process_reports_exactly_zero() {
        let fs = MockFs::tracked_process(PID, 100, 50, 10, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_millis(1337));
        let stat = sampler.sample().unwrap();
        assert_eq!(stat.cpu_percent, 0.0);
    }

    #[test]
    fn test_uses_actual_elapsed_time_not_nominal() {
        let fs = MockFs::tracked_process(PID, 0, 0, 10, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        // A 1 s interval that ran 500 ms late.
        clock.advance(Duration::from_millis(1500));
        set_ticks(&fs, 75, 0, 10);

        assert_close(sampler.sample().unwrap().cpu_percent, 50.0);
    }

    #[test]
    fn test_multithreaded_process_can_exceed_one_core() {
        let fs = MockFs::tracked_process(PID, 0, 0, 10, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_secs(1));
        set_ticks(&fs, 250, 50, 10);

        assert_close(sampler.sample().unwrap().cpu_percent, 300.0);
    }

    #[test]
    fn test_per_core_scale_divides_by_cpu_count() {
        let fs = MockFs::tracked_process(PID, 0, 0, 10, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock).with_cpu_scale(CpuScale::PerCore);

        clock.advance(Duration::from_secs(1));
        set_ticks(&fs, 250, 50, 10);

        assert_close(sampler.sample().unwrap().cpu_percent, 75.0);
    }

    #[test]
    fn test_successive_samples_are_contiguous() {
        let fs = MockFs::tracked_process(PID, 0, 0, 10, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_secs(1));
        set_ticks(&fs, 100, 0, 10);
        assert_close(sampler.sample().unwrap().cpu_percent, 100.0);

        clock.advance(Duration::from_secs(1));
        set_ticks(&fs, 120, 0, 10);
        assert_close(sampler.sample().unwrap().cpu_percent, 20.0);
        assert_eq!(sampler.baseline().user_ticks, 120);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let fs = MockFs::tracked_process(PID, 100, 50, 10, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        set_ticks(&fs, 200, 50, 10);
        assert!(matches!(sampler.sample(), Err(SampleError::ZeroInterval)));
        assert_eq!(sampler.baseline().user_ticks, 100);

        // Back-to-back calls after a good sample are rejected the same way.
        clock.advance(Duration::from_secs(1));
        let stat = sampler.sample().unwrap();
        assert!(stat.cpu_percent.is_finite());
        assert!(matches!(sampler.sample(), Err(SampleError::ZeroInterval)));
    }

    #[test]
    fn test_process_exit_keeps_baseline() {
        let fs = MockFs::tracked_process(PID, 100, 50, 10, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_secs(1));
        fs.remove_process(PID);

        assert!(matches!(
            sampler.sample(),
            Err(SampleError::ProcessUnavailable(PID))
        ));
        assert_eq!(
            *sampler.baseline(),
            ProcessSample {
                user_ticks: 100,
                system_ticks: 50,
                resident_pages: 10,
            }
        );
    }

    #[test]
    fn test_failed_sample_does_not_move_baseline() {
        let fs = MockFs::tracked_process(PID, 100, 50, 10, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_secs(1));
        fs.set_stat(PID, "4242 (worker) S 1 4242");
        assert!(matches!(sampler.sample(), Err(SampleError::Parse(_))));

        // The next success spans both seconds and is measured against the
        // original baseline.
        clock.advance(Duration::from_secs(1));
        set_ticks(&fs, 250, 100, 10);
        assert_close(sampler.sample().unwrap().cpu_percent, 100.0);
    }

    #[test]
    fn test_counter_regression_is_rejected() {
        let fs = MockFs::tracked_process(PID, 1000, 500, 10, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_secs(1));
        set_ticks(&fs, 10, 5, 10);

        assert!(matches!(
            sampler.sample(),
            Err(SampleError::CounterRegression {
                previous: 1500,
                current: 15
            })
        ));
        assert_eq!(sampler.baseline().total_ticks(), 1500);
    }

    #[test]
    fn test_fd_failure_keeps_cpu_and_memory() {
        let fs = MockFs::tracked_process(PID, 0, 0, 1000, 5);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_secs(1));
        set_ticks(&fs, 50, 0, 1000);
        fs.deny_listing(format!("/proc/{PID}/fd"));

        let stat = sampler.sample().unwrap();
        assert_close(stat.cpu_percent, 50.0);
        assert_eq!(stat.memory_bytes, 4_096_000);
        assert_eq!(stat.open_fds, 5);
        assert!(stat.fds_stale);
    }

    #[test]
    fn test_fd_failure_without_history_reports_zero() {
        let fs = MockFs::tracked_process(PID, 0, 0, 10, 5);
        fs.deny_listing(format!("/proc/{PID}/fd"));
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_secs(1));
        let stat = sampler.sample().unwrap();
        assert_eq!(stat.open_fds, 0);
        assert!(stat.fds_stale);
    }

    #[test]
    fn test_fd_count_recovers() {
        let fs = MockFs::tracked_process(PID, 0, 0, 10, 5);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        fs.deny_listing(format!("/proc/{PID}/fd"));
        clock.advance(Duration::from_secs(1));
        assert!(sampler.sample().unwrap().fds_stale);

        fs.set_open_fds(PID, 9);
        clock.advance(Duration::from_secs(1));
        let stat = sampler.sample().unwrap();
        assert_eq!(stat.open_fds, 9);
        assert!(!stat.fds_stale);
    }

    #[test]
    fn test_memory_is_pages_times_page_size() {
        let fs = MockFs::tracked_process(PID, 0, 0, 0, 1);
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        for pages in [0i64, 1, 1000, 262_144] {
            clock.advance(Duration::from_secs(1));
            set_ticks(&fs, 0, 0, pages);
            assert_eq!(sampler.sample().unwrap().memory_bytes, pages as u64 * 4096);
        }
    }

    #[test]
    fn test_new_fails_for_missing_process() {
        let fs = MockFs::typical_system();
        let result = ProcessSampler::new(fs, ManualClock::new(), "/proc", 9999, host());
        assert!(matches!(result, Err(SampleError::ProcessUnavailable(9999))));
    }

    #[test]
    fn test_new_fails_for_malformed_baseline() {
        let fs = MockFs::new();
        fs.add_process(PID, "garbage", 1);
        let result = ProcessSampler::new(fs, ManualClock::new(), "/proc", PID, host());
        assert!(matches!(result, Err(SampleError::Parse(_))));
    }

    #[test]
    fn test_samples_process_with_special_name() {
        let fs = MockFs::with_special_names();
        let clock = Arc::new(ManualClock::new());
        let mut sampler =
            ProcessSampler::new(fs.clone(), Arc::clone(&clock), "/proc", 5002, host()).unwrap();
        assert_eq!(sampler.baseline().total_ticks(), 100);

        clock.advance(Duration::from_secs(1));
        fs.set_stat(5002, &stat_line(5002, "evil) S 1 2 3", 127, 23, 640));
        let stat = sampler.sample().unwrap();
        assert_close(stat.cpu_percent, 50.0);
        assert_eq!(stat.memory_bytes, 640 * 4096);
    }

    #[test]
    fn test_samples_process_with_non_utf8_name() {
        // "ééééééé\xc3": a 15-byte comm cut in the middle of the eighth 'é'.
        let mut comm = "é".repeat(7).into_bytes();
        comm.push(0xc3);
        let line = |utime: u64| {
            let mut bytes = format!("{PID} (").into_bytes();
            bytes.extend_from_slice(&comm);
            bytes.extend_from_slice(
                stat_line(PID, "x", utime, 0, 10)
                    .split_once(')')
                    .unwrap()
                    .1
                    .as_bytes(),
            );
            bytes
        };

        let fs = MockFs::tracked_process(PID, 0, 0, 10, 2);
        fs.add_bytes(format!("/proc/{PID}/stat"), line(0));
        let clock = Arc::new(ManualClock::new());
        let mut sampler = sampler(&fs, &clock);

        clock.advance(Duration::from_secs(1));
        fs.add_bytes(format!("/proc/{PID}/stat"), line(30));
        let stat = sampler.sample().unwrap();
        assert_close(stat.cpu_percent, 30.0);
        assert_eq!(stat.memory_bytes, 40_960);
        assert_eq!(stat.open_fds, 2);
    }

    #[test]
    fn test_only_missing_stat_means_process_gone() {
        assert!(process_is_gone(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(process_is_gone(&io::Error::from_raw_os_error(libc::ESRCH)));
        assert!(!process_is_gone(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!process_is_gone(&io::Error::from(io::ErrorKind::InvalidData)));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            SampleError::ProcessUnavailable(7).to_string(),
            "process 7 is not available"
        );
        assert_eq!(
            SampleError::from(ParseError::new("missing ')' in stat")).to_string(),
            "Parse error: missing ')' in stat"
        );
    }
}
