//! Local terminal handling.

use std::io::{self, IsTerminal};

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::{debug, warn};

/// Fallback size when the local terminal cannot report one.
pub const DEFAULT_SIZE: (u32, u32) = (100, 25);

/// Keeps the local terminal in raw mode until dropped.
///
/// Raw mode hands every keystroke (Ctrl-C, Tab, arrows) to the remote shell
/// unmodified and turns off local echo, since the remote PTY echoes.
pub struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    /// Enter raw mode if stdin is a terminal; otherwise do nothing.
    pub fn enter() -> io::Result<Self> {
        if !io::stdin().is_terminal() {
            debug!("stdin is not a terminal, leaving it in cooked mode");
            return Ok(Self { enabled: false });
        }
        enable_raw_mode()?;
        Ok(Self { enabled: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            if let Err(e) = disable_raw_mode() {
                warn!("failed to restore terminal mode: {}", e);
            }
        }
    }
}

/// Size of the local terminal as (columns, rows).
pub fn size() -> (u32, u32) {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => (u32::from(cols), u32::from(rows)),
        _ => DEFAULT_SIZE,
    }
}
