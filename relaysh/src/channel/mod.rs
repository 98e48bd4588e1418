//! Channel layer: the remote terminal stream and what is read from it.
//!
//! This module handles the interactive terminal channel, line assembly
//! with ANSI stripping, and prompt detection.

mod buffer;
mod patterns;
mod pty;

pub use buffer::{DEFAULT_MAX_LINE, LineBuffer};
pub use patterns::{PROMPT_TERMINATORS, PromptDetector, PromptMatch, RegexPrompt, TerminatorPrompt};
pub use pty::{RemoteTerminal, ShellChannel, TerminalEvent};
