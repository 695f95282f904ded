//! Process resource sampling for Linux.
//!
//! This module reads per-process accounting from the `/proc` filesystem and
//! turns it into CPU, memory and fd figures, with support for mocking so it
//! can be tested on macOS and in CI.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ProcessSampler                       │
//! │  - baseline ProcessSample + Instant                      │
//! │  - HostConfig (ticks/s, page size, cpus)                 │
//! │  ┌────────────────────┐   ┌───────────────────────────┐  │
//! │  │  parse_proc_stat   │   │        FdCounter          │  │
//! │  │  /proc/[pid]/stat  │   │      /proc/[pid]/fd       │  │
//! │  └─────────┬──────────┘   └─────────────┬─────────────┘  │
//! │            └──────────────┬─────────────┘                │
//! │                    ┌──────▼──────┐      ┌───────────┐    │
//! │                    │  FileSystem │      │   Clock   │    │
//! │                    └──────┬──────┘      └─────┬─────┘    │
//! └───────────────────────────┼───────────────────┼──────────┘
//!                    ┌────────┴───────┐    ┌──────┴────────┐
//!                 RealFs           MockFs  Monotonic    Manual
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use procwatch::collector::{HostConfig, MonotonicClock, ProcessSampler, RealFs};
//!
//! let host = HostConfig::initialize()?;
//! let mut sampler = ProcessSampler::new(RealFs::new(), MonotonicClock, "/proc", pid, host)?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! let stat = sampler.sample()?;
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use procwatch::collector::{HostConfig, ManualClock, MockFs, ProcessSampler};
//! use procwatch::collector::mock::stat_line;
//!
//! let fs = MockFs::tracked_process(42, 100, 50, 1000, 3);
//! let clock = Arc::new(ManualClock::new());
//! let host = HostConfig::new(100, 4096, 1).unwrap();
//! let mut sampler = ProcessSampler::new(fs.clone(), clock.clone(), "/proc", 42, host).unwrap();
//!
//! clock.advance(Duration::from_secs(2));
//! fs.set_stat(42, &stat_line(42, "worker", 150, 80, 1000));
//! let stat = sampler.sample().unwrap();
//! assert!((stat.cpu_percent - 40.0).abs() < 1e-9);
//! assert_eq!(stat.memory_bytes, 4_096_000);
//! ```

pub mod host;
pub mod mock;
pub mod procfs;
pub mod sampler;
pub mod traits;

pub use host::{EnvironmentError, HostConfig};
pub use mock::MockFs;
pub use procfs::{FdCounter, FdError, ParseError, ProcessSample, StatFields};
pub use sampler::{CpuScale, ProcessSampler, SampleError, Stat};
pub use traits::{Clock, FileSystem, ManualClock, MonotonicClock, RealFs};
