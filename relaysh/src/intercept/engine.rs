//! The interception state machine.
//!
//! The engine only looks at fully assembled lines. It owns the state that
//! spans a whole session: the remote directory last shown by a prompt, and
//! the transfer command currently in flight.

use std::future::Future;
use std::time::Duration;

use log::debug;

use super::command::{CommandClassifier, PendingCommand};
use crate::channel::{PromptDetector, TerminatorPrompt};

/// Where remote output currently goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Remote output is piped to the local display.
    PassThrough,
    /// A transfer is running or settling; remote output is discarded.
    Intercepting,
}

/// Decides which lines are transfer commands and tracks the transfer
/// lifecycle.
pub struct InterceptionEngine<D = TerminatorPrompt> {
    detector: D,
    classifier: CommandClassifier,
    remote_directory: String,
    pending: Option<PendingCommand>,
    state: EngineState,
}

impl InterceptionEngine<TerminatorPrompt> {
    /// Engine with the default prompt detector; `work_dir` stands in for `~`.
    pub fn new(work_dir: impl Into<String>) -> Self {
        let work_dir = work_dir.into();
        Self::with_detector(TerminatorPrompt::new(work_dir.clone()), work_dir)
    }
}

impl<D: PromptDetector> InterceptionEngine<D> {
    /// Engine with a custom prompt detection strategy.
    pub fn with_detector(detector: D, initial_directory: impl Into<String>) -> Self {
        Self {
            detector,
            classifier: CommandClassifier::default(),
            remote_directory: initial_directory.into(),
            pending: None,
            state: EngineState::PassThrough,
        }
    }

    /// Replace the command classifier.
    pub fn with_classifier(mut self, classifier: CommandClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Evaluate a completed line of terminal output.
    ///
    /// Returns the command to execute when the line is a prompt followed by
    /// a transfer command; the engine is then `Intercepting`. Lines are
    /// ignored while a transfer is in progress.
    pub fn on_line(&mut self, line: &str) -> Option<PendingCommand> {
        if self.state == EngineState::Intercepting {
            return None;
        }

        let prompt = self.detector.detect(line)?;
        let command = self.classifier.classify(prompt.command(line));
        self.remote_directory = prompt.remote_directory;

        let command = command?;
        let pending = PendingCommand {
            command,
            remote_directory: self.remote_directory.clone(),
        };
        debug!(
            "intercepted '{}' in {}",
            pending.verb(),
            pending.remote_directory
        );

        self.pending = Some(pending.clone());
        self.state = EngineState::Intercepting;
        Some(pending)
    }

    /// The transfer finished, successfully or not.
    pub fn complete_transfer(&mut self) {
        self.pending = None;
    }

    /// Output piping has been restored.
    pub fn reattach(&mut self) {
        debug_assert!(self.pending.is_none(), "reattached with a transfer in flight");
        self.pending = None;
        self.state = EngineState::PassThrough;
    }

    /// Whether remote output should reach the local display.
    pub fn is_piping(&self) -> bool {
        self.state == EngineState::PassThrough
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    /// Directory shown by the most recent prompt.
    pub fn remote_directory(&self) -> &str {
        &self.remote_directory
    }
}

/// Waits until residual remote echo has probably stopped arriving after a
/// transfer.
///
/// The remote shell gives no acknowledgement, so implementations can only
/// guess.
pub trait SettleStrategy: Send + Sync {
    fn settle(&self) -> impl Future<Output = ()> + Send;
}

/// Waits a fixed amount of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

/// Delay used when nothing else is configured.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

impl Default for FixedDelay {
    fn default() -> Self {
        Self(DEFAULT_SETTLE_DELAY)
    }
}

impl SettleStrategy for FixedDelay {
    async fn settle(&self) {
        tokio::time::sleep(self.0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RegexPrompt;
    use crate::intercept::command::TransferVerb;

    #[test]
    fn test_non_prompt_line_changes_nothing() {
        let mut engine = InterceptionEngine::new("./downloads");
        assert!(engine.on_line("total 48").is_none());
        assert_eq!(engine.state(), EngineState::PassThrough);
        assert_eq!(engine.remote_directory(), "./downloads");
    }

    #[test]
    fn test_ordinary_command_updates_directory_only() {
        let mut engine = InterceptionEngine::new("./downloads");
        assert!(engine.on_line("user@host:/var/log$ ls -la").is_none());
        assert_eq!(engine.state(), EngineState::PassThrough);
        assert!(engine.is_piping());
        assert_eq!(engine.remote_directory(), "/var/log");
    }

    #[test]
    fn test_transfer_command_enters_intercepting() {
        let mut engine = InterceptionEngine::new("./downloads");
        let pending = engine.on_line("user@host:~$ get report.txt").unwrap();
        assert_eq!(pending.verb(), TransferVerb::Get);
        assert_eq!(pending.command.source, "report.txt");
        assert_eq!(pending.remote_directory, "./downloads");
        assert_eq!(engine.state(), EngineState::Intercepting);
        assert!(!engine.is_piping());
        assert_eq!(engine.pending(), Some(&pending));
    }

    #[test]
    fn test_lines_ignored_while_intercepting() {
        let mut engine = InterceptionEngine::new("./");
        engine.on_line("root@box:/srv# put a.txt").unwrap();
        assert!(engine.on_line("root@box:/tmp# get b.txt").is_none());
        assert_eq!(engine.remote_directory(), "/srv");
        assert_eq!(engine.pending().unwrap().command.source, "a.txt");
    }

    #[test]
    fn test_full_cycle_returns_to_pass_through() {
        let mut engine = InterceptionEngine::new("./");
        engine.on_line("root@box:/srv# put a.txt").unwrap();

        engine.complete_transfer();
        assert!(engine.pending().is_none());
        assert_eq!(engine.state(), EngineState::Intercepting);

        engine.reattach();
        assert_eq!(engine.state(), EngineState::PassThrough);
        assert!(engine.on_line("root@box:/srv# get b.txt").is_some());
    }

    #[test]
    fn test_home_directory_persists_until_next_prompt() {
        let mut engine = InterceptionEngine::new("./downloads");
        engine.on_line("user@host:~$ echo hi");
        assert_eq!(engine.remote_directory(), "./downloads");
        engine.on_line("hi");
        assert_eq!(engine.remote_directory(), "./downloads");
        engine.on_line("user@host:/etc$ ");
        assert_eq!(engine.remote_directory(), "/etc");
    }

    #[test]
    fn test_custom_detector() {
        let detector = RegexPrompt::new(r"\]\$ ", "./").unwrap();
        let mut engine = InterceptionEngine::with_detector(detector, "./");
        assert!(engine.on_line("user@host:~$ get a").is_none());
        let pending = engine.on_line("[user@host:/opt]$ get a").unwrap();
        assert_eq!(pending.remote_directory, "/opt");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_waits() {
        let start = tokio::time::Instant::now();
        FixedDelay(Duration::from_millis(250)).settle().await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_pending_until_elapsed() {
        let delay = FixedDelay(Duration::from_millis(500));
        let mut settle = tokio_test::task::spawn(delay.settle());

        tokio_test::assert_pending!(settle.poll());
        tokio::time::advance(Duration::from_millis(499)).await;
        tokio_test::assert_pending!(settle.poll());
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio_test::assert_ready!(settle.poll());
    }
}
