//! Command interception and stream redirection.
//!
//! Watches the remote terminal's output for a prompt followed by `get` or
//! `put`, runs those commands over a separate file-transfer channel, and
//! leaves every other line to the remote shell.

mod command;
mod config;
mod engine;
mod shell;
mod status;
mod transfer;

pub use command::{CommandClassifier, ParsedCommand, PendingCommand, TransferVerb};
pub use config::InterceptConfig;
pub use engine::{DEFAULT_SETTLE_DELAY, EngineState, FixedDelay, InterceptionEngine, SettleStrategy};
pub use shell::{CLEAR_LINE, InteractiveShell, NEW_PROMPT};
pub use status::{ConsoleStatus, StatusKind, StatusLine, StatusSink};
pub use transfer::{
    COMPLETED_MESSAGE, FileTransfer, SftpChannel, SftpTransfer, TransferChannel, TransferExecutor,
    TransferOutcome, TransferPlan, resolve_remote_path,
};
