//! The interactive session loop.
//!
//! One `tokio::select!` loop moves local keystrokes to the remote terminal
//! and remote output to the local display. When the engine intercepts a
//! transfer command, display piping is cut, the transfer runs alongside
//! the loop, and after it completes the session settles, drains stale
//! output and reattaches.

use std::future::Future;
use std::pin::Pin;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::config::InterceptConfig;
use super::engine::{FixedDelay, InterceptionEngine, SettleStrategy};
use super::status::StatusSink;
use super::transfer::{FileTransfer, TransferExecutor, TransferOutcome};
use crate::channel::{LineBuffer, PromptDetector, RemoteTerminal, TerminalEvent, TerminatorPrompt};
use crate::error::{ChannelError, Result};

/// Ctrl-U: makes the remote shell drop whatever is on its input line.
pub const CLEAR_LINE: &[u8] = b"\x15";

/// Enter: makes the remote shell draw a fresh prompt.
pub const NEW_PROMPT: &[u8] = b"\r";

const INPUT_CHUNK: usize = 1024;

type Slot<'a, T> = Option<Pin<Box<dyn Future<Output = T> + Send + 'a>>>;

/// Interactive shell session with `get` / `put` interception.
pub struct InteractiveShell<T, F, S, D = TerminatorPrompt, W = FixedDelay> {
    terminal: T,
    engine: InterceptionEngine<D>,
    executor: TransferExecutor<F, S>,
    lines: LineBuffer,
    settle: W,
}

impl<T, F, S> InteractiveShell<T, F, S>
where
    T: RemoteTerminal,
    F: FileTransfer,
    S: StatusSink,
{
    pub fn new(terminal: T, transfer: F, status: S, config: &InterceptConfig) -> Self {
        let work_dir = config.work_dir.display().to_string();
        Self {
            terminal,
            engine: InterceptionEngine::new(work_dir),
            executor: TransferExecutor::new(transfer, status, config.work_dir.clone()),
            lines: LineBuffer::new(config.max_line),
            settle: FixedDelay(config.settle_delay),
        }
    }
}

impl<T, F, S, D, W> InteractiveShell<T, F, S, D, W>
where
    T: RemoteTerminal,
    F: FileTransfer,
    S: StatusSink,
    D: PromptDetector,
    W: SettleStrategy,
{
    /// Swap the prompt detection strategy.
    pub fn with_detector<D2: PromptDetector>(self, detector: D2) -> InteractiveShell<T, F, S, D2, W> {
        let engine = InterceptionEngine::with_detector(detector, self.engine.remote_directory());
        InteractiveShell {
            terminal: self.terminal,
            engine,
            executor: self.executor,
            lines: self.lines,
            settle: self.settle,
        }
    }

    /// Swap the settle step.
    pub fn with_settle<W2: SettleStrategy>(self, settle: W2) -> InteractiveShell<T, F, S, D, W2> {
        InteractiveShell {
            terminal: self.terminal,
            engine: self.engine,
            executor: self.executor,
            lines: self.lines,
            settle,
        }
    }

    /// Run until the remote shell exits; returns its exit status.
    ///
    /// Local input EOF is passed on to the remote side; the loop keeps
    /// running until the remote closes the channel.
    pub async fn run<I, O, E>(self, mut input: I, mut output: O, mut errors: E) -> Result<u32>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let Self {
            mut terminal,
            mut engine,
            executor,
            mut lines,
            settle,
        } = self;

        let mut transfer: Slot<'_, TransferOutcome> = None;
        let mut settling: Slot<'_, ()> = None;
        let mut buf = vec![0u8; INPUT_CHUNK];
        let mut input_open = true;

        loop {
            tokio::select! {
                read = input.read(&mut buf), if input_open => {
                    let n = read.map_err(ChannelError::Io)?;
                    if n == 0 {
                        debug!("local input closed");
                        input_open = false;
                        terminal.send_eof().await?;
                    } else {
                        terminal.send(&buf[..n]).await?;
                    }
                }

                event = terminal.recv() => match event {
                    Some(TerminalEvent::Output(data)) => {
                        if !engine.is_piping() {
                            trace!("discarding {} bytes of remote output", data.len());
                            continue;
                        }
                        // Piping stops right after the line holding the transfer command
                        let mut shown = data.len();
                        let mut offset = 0;
                        while let Some((line, used)) = lines.next_line(&data[offset..]) {
                            offset += used;
                            if let Some(pending) = engine.on_line(&line) {
                                shown = offset;
                                lines.clear();
                                transfer = Some(Box::pin(executor.execute(pending)));
                                break;
                            }
                        }

                        output.write_all(&data[..shown]).await.map_err(ChannelError::Io)?;
                        output.flush().await.map_err(ChannelError::Io)?;
                        if shown < data.len() {
                            trace!("discarding {} bytes after transfer command", data.len() - shown);
                        }
                    }
                    Some(TerminalEvent::ErrorOutput(data)) => {
                        if engine.is_piping() {
                            errors.write_all(&data).await.map_err(ChannelError::Io)?;
                            errors.flush().await.map_err(ChannelError::Io)?;
                        }
                    }
                    Some(TerminalEvent::Exit(code)) => {
                        debug!("remote shell exited with status {}", code);
                        return Ok(code);
                    }
                    Some(TerminalEvent::Closed) | None => {
                        debug!("terminal channel closed");
                        return Ok(0);
                    }
                },

                outcome = next_from(&mut transfer), if transfer.is_some() => {
                    transfer = None;
                    engine.complete_transfer();
                    debug!("transfer finished (success: {}), settling", outcome.success);
                    settling = Some(Box::pin(settle.settle()));
                }

                () = next_from(&mut settling), if settling.is_some() => {
                    settling = None;
                    if let Some(code) = drain(&mut terminal, &mut lines) {
                        return Ok(code);
                    }
                    engine.reattach();
                    terminal.send(CLEAR_LINE).await?;
                    terminal.send(NEW_PROMPT).await?;
                    debug!("output piping reattached");
                }
            }
        }
    }
}

/// Await the future in `slot`, or never resolve if the slot is empty.
async fn next_from<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

/// Throw away remote output that arrived but was not read yet, and the
/// partial line assembled from earlier output.
///
/// Returns the exit status if the session ended while draining.
fn drain<T: RemoteTerminal>(terminal: &mut T, lines: &mut LineBuffer) -> Option<u32> {
    lines.clear();
    let mut discarded = 0;
    while let Some(event) = terminal.try_recv() {
        match event {
            TerminalEvent::Output(data) | TerminalEvent::ErrorOutput(data) => discarded += data.len(),
            TerminalEvent::Exit(code) => return Some(code),
            TerminalEvent::Closed => return Some(0),
        }
    }
    debug!("drained {} stale bytes", discarded);
    None
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;

    use super::*;

    #[derive(Default)]
    struct Queued {
        events: VecDeque<TerminalEvent>,
    }

    impl Queued {
        fn with(events: Vec<TerminalEvent>) -> Self {
            Self {
                events: events.into(),
            }
        }
    }

    impl RemoteTerminal for Queued {
        async fn send(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn send_eof(&mut self) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<TerminalEvent> {
            self.events.pop_front()
        }

        fn try_recv(&mut self) -> Option<TerminalEvent> {
            self.events.pop_front()
        }
    }

    fn output(text: &str) -> TerminalEvent {
        TerminalEvent::Output(Bytes::copy_from_slice(text.as_bytes()))
    }

    #[test]
    fn test_drain_empties_queue_and_partial_line() {
        let mut terminal = Queued::with(vec![
            output("late echo\r\n"),
            TerminalEvent::ErrorOutput(Bytes::from_static(b"warning\r\n")),
            output("user@host:~$ "),
        ]);
        let mut lines = LineBuffer::default();
        lines.feed(b"half a li");

        assert_eq!(drain(&mut terminal, &mut lines), None);
        assert!(terminal.events.is_empty());
        assert_eq!(lines.partial(), "");
    }

    #[test]
    fn test_drain_stops_at_exit() {
        let mut terminal = Queued::with(vec![
            output("late echo\r\n"),
            TerminalEvent::Exit(7),
            output("never read"),
        ]);
        let mut lines = LineBuffer::default();

        assert_eq!(drain(&mut terminal, &mut lines), Some(7));
        assert_eq!(terminal.events.len(), 1);
    }

    #[test]
    fn test_drain_stops_at_close() {
        let mut terminal = Queued::with(vec![TerminalEvent::Closed]);
        let mut lines = LineBuffer::default();
        assert_eq!(drain(&mut terminal, &mut lines), Some(0));
    }

    #[test]
    fn test_drain_on_empty_queue() {
        let mut terminal = Queued::default();
        let mut lines = LineBuffer::default();
        assert_eq!(drain(&mut terminal, &mut lines), None);
    }
}
