//! Transfer execution over a file-transfer subchannel.
//!
//! Every failure is caught here and reported as a status line; callers only
//! see a [`TransferOutcome`]. The future returned by
//! [`TransferExecutor::execute`] always resolves.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;

use super::command::{PendingCommand, TransferVerb};
use super::status::{StatusKind, StatusLine, StatusSink};
use crate::error::TransferError;
use crate::transport::SshTransport;

/// Message reported after a successful transfer.
pub const COMPLETED_MESSAGE: &str = "...completed successfully";

/// Opens file-transfer subchannels.
pub trait FileTransfer: Send + Sync {
    type Channel: TransferChannel;

    /// Open a fresh subchannel for a single operation.
    fn open(&self) -> impl Future<Output = Result<Self::Channel, TransferError>> + Send;
}

/// A single-use file-transfer subchannel.
pub trait TransferChannel: Send {
    /// Download `remote` into the local file `local`.
    fn fetch(
        &mut self,
        remote: &str,
        local: &Path,
    ) -> impl Future<Output = Result<(), TransferError>> + Send;

    /// Upload the local file `local` to `remote`.
    fn send(
        &mut self,
        local: &Path,
        remote: &str,
    ) -> impl Future<Output = Result<(), TransferError>> + Send;

    /// Close the subchannel.
    fn close(self) -> impl Future<Output = Result<(), TransferError>> + Send;
}

/// How a transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub success: bool,
    pub message: String,
}

/// Source and destination after defaults and remote path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub verb: TransferVerb,
    pub from: String,
    pub to: String,
}

/// Runs `get` / `put` commands and reports their progress.
pub struct TransferExecutor<F, S> {
    transfer: F,
    status: S,
    work_dir: PathBuf,
}

impl<F: FileTransfer, S: StatusSink> TransferExecutor<F, S> {
    /// `work_dir` is where downloads land when no destination is given.
    pub fn new(transfer: F, status: S, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            transfer,
            status,
            work_dir: work_dir.into(),
        }
    }

    /// Resolve defaults and remote paths for a command.
    pub fn plan(&self, pending: &PendingCommand) -> TransferPlan {
        let command = &pending.command;
        match command.verb {
            TransferVerb::Get => TransferPlan {
                verb: TransferVerb::Get,
                from: resolve_remote_path(&pending.remote_directory, &command.source),
                to: command.destination.clone().unwrap_or_else(|| {
                    self.work_dir
                        .join(remote_base_name(&command.source))
                        .display()
                        .to_string()
                }),
            },
            TransferVerb::Put => TransferPlan {
                verb: TransferVerb::Put,
                from: command.source.clone(),
                to: command
                    .destination
                    .clone()
                    .unwrap_or_else(|| format!("./{}", local_base_name(&command.source))),
            },
        }
    }

    /// Run a transfer to completion, reporting start and result.
    pub async fn execute(&self, pending: PendingCommand) -> TransferOutcome {
        let plan = self.plan(&pending);
        self.status
            .emit(StatusLine::now(StatusKind::Started, plan.verb.announce(&plan.from, &plan.to)));

        match self.run(&plan).await {
            Ok(()) => {
                debug!("{} {} -> {} completed", plan.verb, plan.from, plan.to);
                self.status
                    .emit(StatusLine::now(StatusKind::Succeeded, COMPLETED_MESSAGE));
                TransferOutcome {
                    success: true,
                    message: COMPLETED_MESSAGE.to_string(),
                }
            }
            Err(e) => {
                debug!("{} {} -> {} failed: {}", plan.verb, plan.from, plan.to, e);
                let message = e.to_string();
                self.status
                    .emit(StatusLine::now(StatusKind::Failed, message.clone()));
                TransferOutcome {
                    success: false,
                    message,
                }
            }
        }
    }

    async fn run(&self, plan: &TransferPlan) -> Result<(), TransferError> {
        let mut channel = self.transfer.open().await?;

        let result = match plan.verb {
            TransferVerb::Get => channel.fetch(&plan.from, Path::new(&plan.to)).await,
            TransferVerb::Put => channel.send(Path::new(&plan.from), &plan.to).await,
        };

        let closed = channel.close().await;
        result?;
        if let Err(e) = closed {
            warn!("failed to close transfer channel: {}", e);
        }
        Ok(())
    }
}

/// Join `source` onto the remote directory and normalize it POSIX-style.
///
/// Backslashes become `/`. Absolute sources are kept as they are.
pub fn resolve_remote_path(directory: &str, source: &str) -> String {
    let source = source.replace('\\', "/");
    let directory = directory.trim().replace('\\', "/");
    if source.starts_with('/') || directory.is_empty() {
        normalize_posix(&source)
    } else {
        normalize_posix(&format!("{}/{}", directory, source))
    }
}

/// Collapse `.`, `..` and repeated separators without touching the filesystem.
fn normalize_posix(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            name => parts.push(name),
        }
    }

    let body = parts.join("/");
    if absolute {
        format!("/{}", body)
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body
    }
}

fn remote_base_name(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
}

fn local_base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// [`FileTransfer`] over the session's SFTP subsystem.
#[derive(Clone)]
pub struct SftpTransfer {
    transport: Arc<SshTransport>,
}

impl SftpTransfer {
    pub fn new(transport: Arc<SshTransport>) -> Self {
        Self { transport }
    }
}

impl FileTransfer for SftpTransfer {
    type Channel = SftpChannel;

    async fn open(&self) -> Result<SftpChannel, TransferError> {
        let session = self.transport.open_sftp().await?;
        Ok(SftpChannel { session })
    }
}

/// One SFTP session, used for a single fetch or send.
pub struct SftpChannel {
    session: SftpSession,
}

impl TransferChannel for SftpChannel {
    async fn fetch(&mut self, remote: &str, local: &Path) -> Result<(), TransferError> {
        let mut source = self.session.open(remote).await?;
        let mut target = tokio::fs::File::create(local).await?;
        let copied = tokio::io::copy(&mut source, &mut target).await?;
        target.flush().await?;
        debug!("fetched {} bytes from {}", copied, remote);
        Ok(())
    }

    async fn send(&mut self, local: &Path, remote: &str) -> Result<(), TransferError> {
        let mut source = tokio::fs::File::open(local).await?;
        let mut target = self.session.create(remote).await?;
        let copied = tokio::io::copy(&mut source, &mut target).await?;
        target.shutdown().await?;
        debug!("sent {} bytes to {}", copied, remote);
        Ok(())
    }

    async fn close(self) -> Result<(), TransferError> {
        self.session.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::intercept::command::ParsedCommand;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Fetch(String, PathBuf),
        Send(PathBuf, String),
        Close,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_open: bool,
        fail_transfer: bool,
    }

    struct RecorderChannel {
        calls: Arc<Mutex<Vec<Call>>>,
        fail: bool,
    }

    impl RecorderChannel {
        fn outcome(&self) -> Result<(), TransferError> {
            if self.fail {
                Err(TransferError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "No such file",
                )))
            } else {
                Ok(())
            }
        }
    }

    impl FileTransfer for Recorder {
        type Channel = RecorderChannel;

        async fn open(&self) -> Result<RecorderChannel, TransferError> {
            if self.fail_open {
                return Err(TransferError::ChannelOpen {
                    message: "subsystem request failed".to_string(),
                });
            }
            Ok(RecorderChannel {
                calls: self.calls.clone(),
                fail: self.fail_transfer,
            })
        }
    }

    impl TransferChannel for RecorderChannel {
        async fn fetch(&mut self, remote: &str, local: &Path) -> Result<(), TransferError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Fetch(remote.to_string(), local.to_path_buf()));
            self.outcome()
        }

        async fn send(&mut self, local: &Path, remote: &str) -> Result<(), TransferError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Send(local.to_path_buf(), remote.to_string()));
            self.outcome()
        }

        async fn close(self) -> Result<(), TransferError> {
            self.calls.lock().unwrap().push(Call::Close);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Lines(Mutex<Vec<StatusLine>>);

    impl StatusSink for &Lines {
        fn emit(&self, line: StatusLine) {
            self.0.lock().unwrap().push(line);
        }
    }

    fn pending(verb: TransferVerb, source: &str, destination: Option<&str>, dir: &str) -> PendingCommand {
        PendingCommand {
            command: ParsedCommand {
                verb,
                source: source.to_string(),
                destination: destination.map(str::to_string),
            },
            remote_directory: dir.to_string(),
        }
    }

    fn kinds(lines: &Lines) -> Vec<StatusKind> {
        lines.0.lock().unwrap().iter().map(|l| l.kind).collect()
    }

    #[test]
    fn test_resolve_remote_path() {
        assert_eq!(resolve_remote_path("/var/log", "app.log"), "/var/log/app.log");
        assert_eq!(resolve_remote_path("./downloads", "report.txt"), "downloads/report.txt");
        assert_eq!(resolve_remote_path("/var/log/", "../tmp/./x"), "/var/tmp/x");
        assert_eq!(resolve_remote_path("/srv", "/etc/hosts"), "/etc/hosts");
        assert_eq!(resolve_remote_path("/", ".."), "/");
        assert_eq!(resolve_remote_path("", "a.txt"), "a.txt");
        assert_eq!(resolve_remote_path("./", "../up.txt"), "../up.txt");
    }

    #[test]
    fn test_backslashes_become_forward_slashes() {
        assert_eq!(resolve_remote_path("/home/u", "sub\\file.txt"), "/home/u/sub/file.txt");
        assert_eq!(resolve_remote_path("C:\\data", "f"), "C:/data/f");
    }

    #[test]
    fn test_default_destinations_keep_base_name() {
        let lines = Lines::default();
        let executor = TransferExecutor::new(Recorder::default(), &lines, "./downloads");

        for source in ["report.txt", "dir/report.txt", "/abs/dir/report.txt", "win\\report.txt"] {
            let plan = executor.plan(&pending(TransferVerb::Get, source, None, "/srv"));
            assert_eq!(Path::new(&plan.to).file_name().unwrap(), "report.txt", "get {source}");

            let plan = executor.plan(&pending(TransferVerb::Put, source, None, "/srv"));
            if !source.contains('\\') {
                assert_eq!(plan.to, "./report.txt", "put {source}");
            }
        }
    }

    #[test]
    fn test_explicit_destinations_are_used() {
        let lines = Lines::default();
        let executor = TransferExecutor::new(Recorder::default(), &lines, "./");

        let plan = executor.plan(&pending(TransferVerb::Get, "a.txt", Some("/tmp/b.txt"), "/srv"));
        assert_eq!(plan.from, "/srv/a.txt");
        assert_eq!(plan.to, "/tmp/b.txt");

        let plan = executor.plan(&pending(TransferVerb::Put, "app.log", Some("remote-app.log"), "/var/log"));
        assert_eq!(plan.from, "app.log");
        assert_eq!(plan.to, "remote-app.log");
    }

    #[tokio::test]
    async fn test_get_success_reports_and_closes() {
        let lines = Lines::default();
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();
        let executor = TransferExecutor::new(recorder, &lines, "./downloads");

        let outcome = executor
            .execute(pending(TransferVerb::Get, "report.txt", None, "./downloads"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.message, COMPLETED_MESSAGE);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Fetch(
                    "downloads/report.txt".to_string(),
                    PathBuf::from("./downloads/report.txt")
                ),
                Call::Close,
            ]
        );
        assert_eq!(kinds(&lines), vec![StatusKind::Started, StatusKind::Succeeded]);
        assert_eq!(
            lines.0.lock().unwrap()[0].message,
            "Downloading from downloads/report.txt to ./downloads/report.txt"
        );
    }

    #[tokio::test]
    async fn test_transfer_failure_still_closes_channel() {
        let lines = Lines::default();
        let recorder = Recorder {
            fail_transfer: true,
            ..Default::default()
        };
        let calls = recorder.calls.clone();
        let executor = TransferExecutor::new(recorder, &lines, "./");

        let outcome = executor
            .execute(pending(TransferVerb::Put, "missing.bin", None, "/srv"))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "No such file");
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Close));
        assert_eq!(kinds(&lines), vec![StatusKind::Started, StatusKind::Failed]);
    }

    #[tokio::test]
    async fn test_open_failure_reports_one_error() {
        let lines = Lines::default();
        let recorder = Recorder {
            fail_open: true,
            ..Default::default()
        };
        let calls = recorder.calls.clone();
        let executor = TransferExecutor::new(recorder, &lines, "./");

        let outcome = executor
            .execute(pending(TransferVerb::Get, "a.txt", None, "/srv"))
            .await;

        assert!(!outcome.success);
        assert!(outcome.message.contains("subsystem request failed"));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(kinds(&lines), vec![StatusKind::Started, StatusKind::Failed]);
    }
}
