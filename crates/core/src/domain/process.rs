// Process Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{DomainError, Result};

/// OS process identifier
///
/// Always > 0 and representable as `pid_t`, so it can be handed to `kill(2)`
/// without another range check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Pid(u32);

impl Pid {
    pub fn new(raw: i64) -> Result<Self> {
        if raw <= 0 || raw > i64::from(i32::MAX) {
            return Err(DomainError::InvalidPid(raw));
        }
        Ok(Self(raw as u32))
    }

    /// Parse the content of a pid file (decimal pid, surrounding whitespace ignored)
    pub fn parse_pid_file(content: &str) -> Result<Self> {
        let trimmed = content.trim();
        let raw: i64 = trimmed
            .parse()
            .map_err(|_| DomainError::InvalidPidFile(trimmed.to_string()))?;
        Self::new(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn as_i32(&self) -> i32 {
        self.0 as i32
    }
}

impl TryFrom<i64> for Pid {
    type Error = DomainError;

    fn try_from(raw: i64) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<Pid> for i64 {
    fn from(pid: Pid) -> Self {
        i64::from(pid.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single row of a process table snapshot
///
/// Produced fresh by every scan and never mutated afterwards. The process it
/// describes may already be gone by the time the record is inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub command_line: String,
}

impl ProcessRecord {
    pub fn new(pid: Pid, command_line: impl Into<String>) -> Self {
        Self {
            pid,
            command_line: command_line.into(),
        }
    }
}

impl fmt::Display for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.pid, self.command_line)
    }
}

/// Case-sensitive substring patterns matched against full command lines
///
/// Empty patterns are dropped on construction: an empty string would match
/// every process on the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessPatterns(Vec<String>);

impl ProcessPatterns {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            patterns
                .into_iter()
                .map(Into::into)
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    /// True if `command_line` contains at least one pattern
    pub fn matches(&self, command_line: &str) -> bool {
        self.0.iter().any(|p| command_line.contains(p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for ProcessPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}
