//! Parser for `/proc/[pid]/stat`.
//!
//! A pure function over the line's content, designed to be easily testable
//! with string inputs.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Zero-based positions of the fields extracted from a stat line.
///
/// Positions follow `proc(5)` numbering minus one: pid is 0, comm is 1,
/// state is 2, and so on. Positions 0 and 1 can never be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFields {
    pub utime: usize,
    pub stime: usize,
    pub rss: usize,
}

impl StatFields {
    /// Field layout documented in `proc(5)`.
    pub const KERNEL: StatFields = StatFields {
        utime: 13,
        stime: 14,
        rss: 23,
    };
}

impl Default for StatFields {
    fn default() -> Self {
        Self::KERNEL
    }
}

/// The accounting fields of one stat line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSample {
    /// Time scheduled in user mode, in clock ticks.
    pub user_ticks: u64,
    /// Time scheduled in kernel mode, in clock ticks.
    pub system_ticks: u64,
    /// Resident set size, in pages.
    pub resident_pages: u64,
}

impl ProcessSample {
    pub fn total_ticks(&self) -> u64 {
        self.user_ticks.saturating_add(self.system_ticks)
    }
}

/// Parses `/proc/[pid]/stat` content.
///
/// The format is tricky because the comm field can contain spaces and
/// parentheses. Format: pid (comm) state ppid pgrp session tty_nr ...
///
/// The comm field runs from the first '(' to the last ')'; everything after
/// it is split on whitespace, so the token for position N sits at index N - 2
/// of the remainder.
pub fn parse_proc_stat(content: &str, fields: &StatFields) -> Result<ProcessSample, ParseError> {
    let content = content.trim();

    // Find the comm field boundaries (enclosed in parentheses)
    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    // The pid is not needed, but a line without one is not a stat line.
    content[..open_paren]
        .trim()
        .parse::<u32>()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let remaining: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();

    let parse_field = |pos: usize, name: &str| -> Result<u64, ParseError> {
        let idx = pos
            .checked_sub(2)
            .ok_or_else(|| ParseError::new(format!("{} cannot be read from position {}", name, pos)))?;
        let token = remaining.get(idx).ok_or_else(|| {
            ParseError::new(format!(
                "missing field {} at position {}: line has {} fields",
                name,
                pos,
                remaining.len() + 2
            ))
        })?;
        token
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}: {:?}", name, token)))
    };

    Ok(ProcessSample {
        user_ticks: parse_field(fields.utime, "utime")?,
        system_ticks: parse_field(fields.stime, "stime")?,
        resident_pages: parse_field(fields.rss, "rss")?,
    })
}
