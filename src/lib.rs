//! procwatch - resource usage sampling for a launched process.
//!
//! Provides:
//! - `collector` - `/proc` parsing, fd counting and the incremental sampler
//! - `launcher` - spawning and reaping the monitored program
//! - `output` - the observation log (text or JSON lines)
//! - `monitor` - the cancellable periodic sampling loop

pub mod collector;
pub mod launcher;
pub mod monitor;
pub mod output;
