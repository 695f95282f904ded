//! Readers for the Linux `/proc` filesystem.
//!
//! This module provides the stat parser and the fd counter used by the
//! process sampler.

pub mod fd;
pub mod parser;

pub use fd::{FdCounter, FdError};
pub use parser::{ParseError, ProcessSample, StatFields, parse_proc_stat};
