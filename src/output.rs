//! Observation log: one line per sample.
//!
//! Text lines look like
//! `[Thu Oct 15 10:00:00 2026] cpu (%): 40.00, memory (bytes): 4096000, fds: 3`.
//! JSON lines carry the same figures plus the pid and an RFC 3339 timestamp.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::collector::Stat;

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Consumer of successful samples.
pub trait StatSink {
    fn record(&mut self, pid: u32, stat: &Stat) -> io::Result<()>;
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    timestamp: String,
    pid: u32,
    #[serde(flatten)]
    stat: &'a Stat,
}

/// Writes formatted samples to `W`, flushing after every line.
pub struct StatLog<W: Write> {
    out: W,
    format: LogFormat,
}

impl StatLog<BufWriter<File>> {
    /// Opens `path` for appending, creating it if needed.
    pub fn open_append(path: impl AsRef<Path>, format: LogFormat) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file), format))
    }
}

impl<W: Write> StatLog<W> {
    pub fn new(out: W, format: LogFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Writes one line stamped with `at`.
    pub fn write_at(&mut self, at: DateTime<Local>, pid: u32, stat: &Stat) -> io::Result<()> {
        match self.format {
            LogFormat::Text => writeln!(self.out, "{}", format_text(at, stat))?,
            LogFormat::Json => {
                let record = JsonRecord {
                    timestamp: at.to_rfc3339(),
                    pid,
                    stat,
                };
                serde_json::to_writer(&mut self.out, &record)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()
    }
}

impl<W: Write> StatSink for StatLog<W> {
    fn record(&mut self, pid: u32, stat: &Stat) -> io::Result<()> {
        self.write_at(Local::now(), pid, stat)
    }
}

fn format_text(at: DateTime<Local>, stat: &Stat) -> String {
    format!(
        "[{}] cpu (%): {:.2}, memory (bytes): {}, fds: {}{}",
        at.format("%c"),
        stat.cpu_percent,
        stat.memory_bytes,
        stat.open_fds,
        if stat.fds_stale { " (stale)" } else { "" }
    )
}
