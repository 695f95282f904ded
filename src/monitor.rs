//! The periodic sampling loop.
//!
//! Ticks are scheduled against absolute deadlines, so time spent sampling and
//! writing does not push later ticks back. Shutdown is checked between cycles
//! and while sleeping; a cycle that has started always completes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::collector::traits::{Clock, FileSystem};
use crate::collector::{ProcessSampler, SampleError};
use crate::launcher::ChildProcess;
use crate::output::StatSink;

/// Longest uninterrupted sleep between shutdown checks.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// Stop after this many successful samples.
    pub max_samples: Option<u64>,
}

impl MonitorConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_samples: None,
        }
    }

    pub fn with_max_samples(mut self, max_samples: u64) -> Self {
        self.max_samples = Some(max_samples);
        self
    }
}

/// Cross-thread shutdown request, set from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Running,
    /// Exited with this code; `None` when killed by a signal.
    Exited(Option<i32>),
}

/// Tells the loop whether the monitored program is still running.
pub trait ChildWatch {
    fn poll(&mut self) -> ChildState;
}

impl ChildWatch for ChildProcess {
    fn poll(&mut self) -> ChildState {
        match self.try_exit_status() {
            Ok(Some(status)) => ChildState::Exited(status.code()),
            Ok(None) => ChildState::Running,
            Err(e) => {
                warn!("Failed to check child status: {}", e);
                ChildState::Running
            }
        }
    }
}

/// A process the monitor did not start and cannot wait for.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupervised;

impl ChildWatch for Unsupervised {
    fn poll(&mut self) -> ChildState {
        ChildState::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    ChildExited(Option<i32>),
    SampleLimit,
}

/// What happened during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSummary {
    pub samples_ok: u64,
    pub samples_failed: u64,
    pub stop_reason: StopReason,
}

/// Drives a sampler on a fixed schedule and hands each result to a sink.
pub struct Monitor<F: FileSystem + Clone, C: Clock> {
    sampler: ProcessSampler<F, C>,
    config: MonitorConfig,
}

impl<F: FileSystem + Clone, C: Clock> Monitor<F, C> {
    pub fn new(sampler: ProcessSampler<F, C>, config: MonitorConfig) -> Self {
        Self { sampler, config }
    }

    /// Runs until shutdown is requested, the child exits or the sample limit
    /// is reached.
    ///
    /// Failed samples and sink errors are logged and never end the loop.
    pub fn run(
        &mut self,
        sink: &mut impl StatSink,
        child: &mut impl ChildWatch,
        shutdown: &ShutdownFlag,
    ) -> MonitorSummary {
        let pid = self.sampler.pid();
        let interval = self.config.interval;
        let mut samples_ok: u64 = 0;
        let mut samples_failed: u64 = 0;
        let mut next_tick = Instant::now() + interval;

        info!("Sampling pid {} every {:?}", pid, interval);

        let stop_reason = loop {
            if !sleep_until(next_tick, shutdown) {
                break StopReason::Shutdown;
            }

            next_tick += interval;
            let now = Instant::now();
            if next_tick < now {
                warn!(
                    "Sampling fell behind by {:?}, skipping missed ticks",
                    now - next_tick
                );
                next_tick = now + interval;
            }

            if let ChildState::Exited(code) = child.poll() {
                info!("Process {} exited with code {:?}", pid, code);
                break StopReason::ChildExited(code);
            }

            match self.sampler.sample() {
                Ok(stat) => {
                    samples_ok += 1;
                    debug!(
                        "Sample #{}: cpu={:.2}% mem={}B fds={}",
                        samples_ok, stat.cpu_percent, stat.memory_bytes, stat.open_fds
                    );
                    if let Err(e) = sink.record(pid, &stat) {
                        error!("Failed to write sample: {}", e);
                    }
                    if self.config.max_samples.is_some_and(|max| samples_ok >= max) {
                        break StopReason::SampleLimit;
                    }
                }
                Err(e @ SampleError::ProcessUnavailable(_)) => {
                    samples_failed += 1;
                    debug!("Skipping sample: {}", e);
                }
                Err(e) => {
                    samples_failed += 1;
                    warn!("Skipping sample: {}", e);
                }
            }
        };

        MonitorSummary {
            samples_ok,
            samples_failed,
            stop_reason,
        }
    }
}

/// Sleeps until `deadline` in short slices. Returns `false` if shutdown was
/// requested first.
fn sleep_until(deadline: Instant, shutdown: &ShutdownFlag) -> bool {
    loop {
        if shutdown.is_requested() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
