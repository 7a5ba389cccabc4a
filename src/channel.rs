//! The command channel between the application and its watchdog.
//!
//! A one-directional pipe carrying ASCII lines of the form `"<mode> <id>\n"`.
//! There is no acknowledgement and no return channel: a write either lands,
//! or the watchdog has already begun tearing down.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::OwnedFd;

/// A single instruction to the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Track `id`.
    Add(u32),
    /// Stop tracking `id`.
    Remove(u32),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Add(id) => write!(f, "a {id}"),
            Command::Remove(id) => write!(f, "r {id}"),
        }
    }
}

/// Write end of the pipe, owned exclusively by the supervisor. Dropping it
/// is the one signal the watchdog acts on.
#[derive(Debug)]
pub(crate) struct CommandChannel {
    writer: File,
}

impl CommandChannel {
    pub(crate) fn new(write_end: OwnedFd) -> Self {
        Self {
            writer: File::from(write_end),
        }
    }

    /// Send one instruction: a single blocking write of the complete line,
    /// flushed before returning.
    pub(crate) fn send(&mut self, command: Command) -> io::Result<()> {
        self.write_line(&command.to_string())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.writer.write_all(&bytes)?;
        self.writer.flush()
    }

    /// Test-only escape hatch for writing arbitrary lines.
    #[cfg(test)]
    pub(crate) fn send_raw(&mut self, line: &str) -> io::Result<()> {
        self.write_line(line)
    }
}
