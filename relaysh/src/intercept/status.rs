//! Timestamped status lines shown while a transfer runs.

use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, Local};
use log::warn;

/// What a status line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// The transfer is about to start.
    Started,
    /// The transfer finished.
    Succeeded,
    /// The transfer (or opening its channel) failed.
    Failed,
}

/// One `[HH:MM:SS] message` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub at: DateTime<Local>,
    pub message: String,
}

impl StatusLine {
    /// Create a line stamped with the current local time.
    pub fn now(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            at: Local::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Destination for status lines.
pub trait StatusSink: Send + Sync {
    fn emit(&self, line: StatusLine);
}

/// Writes status lines to the local terminal.
///
/// Progress goes to stdout, failures to stderr. Lines end in `\r\n`
/// because the terminal is in raw mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleStatus;

impl ConsoleStatus {
    fn write(mut out: impl Write, line: &StatusLine) -> io::Result<()> {
        if line.kind == StatusKind::Started {
            out.write_all(b"\r\n")?;
        }
        write!(out, "{}\r\n", line)?;
        out.flush()
    }
}

impl StatusSink for ConsoleStatus {
    fn emit(&self, line: StatusLine) {
        let result = match line.kind {
            StatusKind::Failed => Self::write(io::stderr().lock(), &line),
            StatusKind::Started | StatusKind::Succeeded => Self::write(io::stdout().lock(), &line),
        };
        if let Err(e) = result {
            warn!("failed to write status line: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_display_format() {
        let line = StatusLine {
            kind: StatusKind::Succeeded,
            at: Local.with_ymd_and_hms(2024, 5, 1, 9, 4, 7).unwrap(),
            message: "...completed successfully".to_string(),
        };
        assert_eq!(line.to_string(), "[09:04:07] ...completed successfully");
    }

    #[test]
    fn test_started_line_is_preceded_by_blank_line() {
        let line = StatusLine {
            kind: StatusKind::Started,
            at: Local.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap(),
            message: "Uploading from a to ./a".to_string(),
        };
        let mut out = Vec::new();
        ConsoleStatus::write(&mut out, &line).unwrap();
        assert_eq!(out, b"\r\n[23:59:00] Uploading from a to ./a\r\n");
    }
}
