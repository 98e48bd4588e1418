//! # relaysh
//!
//! Interactive SSH shell client with in-session file transfer.
//!
//! relaysh opens a PTY-backed shell on a remote host and pipes it to the
//! local terminal. It watches the remote output for a shell prompt followed
//! by `get <remote> [local]` or `put <local> [remote]`. When it sees one, it
//! runs the transfer over a separate SFTP subchannel, relative to the
//! directory shown in the prompt. Every other command is left to the remote
//! shell.
//!
//! ## Features
//!
//! - Async SSH connections via russh
//! - Prompt detection by terminator scan or custom regex
//! - SFTP downloads and uploads with timestamped status lines
//! - Local (`-L`) and remote (`-R`) port forwarding
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use relaysh::intercept::{ConsoleStatus, InterceptConfig, InteractiveShell, SftpTransfer};
//! use relaysh::{AuthMethod, SshConfig, SshTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), relaysh::Error> {
//!     let auth = AuthMethod::Password("secret".to_string().into());
//!     let config = SshConfig::new("10.8.0.22", 22, "root", auth);
//!
//!     let transport = Arc::new(SshTransport::connect(config).await?);
//!     let terminal = transport.open_shell().await?;
//!
//!     let shell = InteractiveShell::new(
//!         terminal,
//!         SftpTransfer::new(transport.clone()),
//!         ConsoleStatus,
//!         &InterceptConfig::default(),
//!     );
//!     let code = shell
//!         .run(tokio::io::stdin(), tokio::io::stdout(), tokio::io::stderr())
//!         .await?;
//!
//!     transport.close().await?;
//!     std::process::exit(code as i32);
//! }
//! ```

pub mod channel;
pub mod cli;
pub mod error;
pub mod forward;
pub mod intercept;
pub mod terminal;
pub mod transport;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use intercept::{InterceptConfig, InteractiveShell};
pub use transport::{AuthMethod, HostKeyVerification, SshConfig, SshTransport};
