//! The interactive terminal channel.

use std::future::Future;

use bytes::Bytes;
use futures_util::FutureExt;
use log::trace;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use crate::error::{ChannelError, Result};

/// Something the remote terminal produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Bytes written to the PTY's standard output.
    Output(Bytes),

    /// Bytes written to the remote standard error stream.
    ErrorOutput(Bytes),

    /// The remote shell exited with this status.
    Exit(u32),

    /// The channel was closed without an exit status.
    Closed,
}

/// Duplex byte stream bound to a remote pseudo-terminal.
pub trait RemoteTerminal: Send {
    /// Write keystrokes to the remote terminal.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Signal that no more local input will follow.
    fn send_eof(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next event; `None` once the channel is gone.
    fn recv(&mut self) -> impl Future<Output = Option<TerminalEvent>> + Send;

    /// Take an already-buffered event without waiting; `None` when nothing
    /// is queued.
    fn try_recv(&mut self) -> Option<TerminalEvent>;
}

/// [`RemoteTerminal`] over a russh session channel with a PTY and shell.
pub struct ShellChannel {
    channel: Channel<Msg>,
}

impl ShellChannel {
    pub(crate) fn new(channel: Channel<Msg>) -> Self {
        Self { channel }
    }

    /// Map a channel message to a terminal event, skipping bookkeeping
    /// messages (window adjustments, success replies, ...).
    fn translate(msg: ChannelMsg) -> Option<TerminalEvent> {
        match msg {
            ChannelMsg::Data { data } => Some(TerminalEvent::Output(Bytes::copy_from_slice(&data[..]))),
            ChannelMsg::ExtendedData { data, .. } => {
                Some(TerminalEvent::ErrorOutput(Bytes::copy_from_slice(&data[..])))
            }
            ChannelMsg::ExitStatus { exit_status } => Some(TerminalEvent::Exit(exit_status)),
            ChannelMsg::Close => Some(TerminalEvent::Closed),
            other => {
                trace!("ignoring channel message: {:?}", other);
                None
            }
        }
    }
}

impl RemoteTerminal for ShellChannel {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await.map_err(ChannelError::Ssh)?;
        Ok(())
    }

    async fn send_eof(&mut self) -> Result<()> {
        self.channel.eof().await.map_err(ChannelError::Ssh)?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<TerminalEvent> {
        loop {
            let msg = self.channel.wait().await?;
            if let Some(event) = Self::translate(msg) {
                return Some(event);
            }
        }
    }

    /// Polls the channel once, outside tokio's cooperative budget, so an
    /// exhausted budget cannot make queued messages look absent.
    fn try_recv(&mut self) -> Option<TerminalEvent> {
        loop {
            let msg = tokio::task::unconstrained(self.channel.wait()).now_or_never()??;
            if let Some(event) = Self::translate(msg) {
                return Some(event);
            }
        }
    }
}
