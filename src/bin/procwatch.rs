//! procwatch - launch a program and log its resource usage.
//!
//! Every interval the CPU percentage, resident memory and open fd count of
//! the launched process are appended to a log file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use procwatch::collector::{CpuScale, HostConfig, MonotonicClock, ProcessSampler, RealFs};
use procwatch::launcher::ChildProcess;
use procwatch::monitor::{Monitor, MonitorConfig, ShutdownFlag, StopReason};
use procwatch::output::{LogFormat, StatLog};

/// Launch a program and periodically log its CPU, memory and fd usage.
#[derive(Parser)]
#[command(name = "procwatch", version)]
struct Args {
    /// Program to launch.
    executable: PathBuf,

    /// Sampling interval in seconds.
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Arguments passed to the program (after `--`).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<OsString>,

    /// File the samples are appended to.
    #[arg(short = 'o', long, default_value = "log.txt")]
    log_file: PathBuf,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,

    /// Divide CPU percentage by the number of CPUs, so 100% means every core busy.
    #[arg(long)]
    per_core: bool,

    /// Stop after this many samples.
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Kill the program when procwatch is interrupted.
    #[arg(long)]
    kill_on_exit: bool,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// `[date] cpu (%): .., memory (bytes): .., fds: ..`
    Text,
    /// One JSON object per line.
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => LogFormat::Text,
            FormatArg::Json => LogFormat::Json,
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(LevelFilter::from_level(level).into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Takes the baseline sample of the launched child.
///
/// A child that cannot be sampled is killed, so it is not left running
/// unmonitored after procwatch exits.
fn start_sampler(
    child: &mut ChildProcess,
    proc_path: &Path,
    host: HostConfig,
    scale: CpuScale,
) -> Option<ProcessSampler<RealFs, MonotonicClock>> {
    match ProcessSampler::new(RealFs::new(), MonotonicClock, proc_path, child.pid(), host) {
        Ok(sampler) => Some(sampler.with_cpu_scale(scale)),
        Err(e) => {
            error!("Cannot start sampling pid {}: {}", child.pid(), e);
            if let Err(e) = child.kill() {
                error!("Failed to kill pid {}: {}", child.pid(), e);
            }
            None
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("procwatch {} starting", env!("CARGO_PKG_VERSION"));

    let host = match HostConfig::initialize() {
        Ok(host) => host,
        Err(e) => {
            error!("Cannot read host configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Host: {} ticks/s, page size {} bytes, {} cpus",
        host.ticks_per_second(),
        host.page_size_bytes(),
        host.cpu_count()
    );

    let mut log = match StatLog::open_append(&args.log_file, args.format.into()) {
        Ok(log) => log,
        Err(e) => {
            error!("Cannot open {}: {}", args.log_file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut child = match ChildProcess::spawn(&args.executable, &args.args) {
        Ok(child) => child,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let scale = if args.per_core {
        CpuScale::PerCore
    } else {
        CpuScale::SingleCore
    };
    let Some(sampler) = start_sampler(&mut child, &args.proc_path, host, scale) else {
        return ExitCode::FAILURE;
    };

    // Setup graceful shutdown
    let shutdown = ShutdownFlag::new();
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.request();
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    let mut config = MonitorConfig::new(Duration::from_secs(args.interval));
    if let Some(count) = args.count {
        config = config.with_max_samples(count);
    }
    info!(
        "Config: interval={}s, log={}, format={:?}, scale={:?}",
        args.interval,
        args.log_file.display(),
        args.format,
        scale
    );

    let mut monitor = Monitor::new(sampler, config);
    let summary = monitor.run(&mut log, &mut child, &shutdown);

    info!(
        "Stopped ({:?}): {} samples logged, {} skipped",
        summary.stop_reason, summary.samples_ok, summary.samples_failed
    );

    if args.kill_on_exit
        && summary.stop_reason == StopReason::Shutdown
        && let Err(e) = child.kill()
    {
        error!("Failed to kill pid {}: {}", child.pid(), e);
    }

    ExitCode::SUCCESS
}
