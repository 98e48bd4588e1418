//! Error types for relaysh.

use std::io;
use thiserror::Error;

/// Main error type for relaysh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Terminal channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// File transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Command-line / configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Transport layer errors (SSH connection, authentication).
///
/// These are fatal: the session cannot continue without a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key is not in known_hosts (strict mode)
    #[error("Host key for {host}:{port} is not known")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Interactive terminal channel errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to allocate a PTY on the remote side
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Failed to request shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// Local terminal I/O error
    #[error("Terminal I/O error: {0}")]
    Io(#[from] io::Error),
}

/// File transfer errors.
///
/// Never fatal: the transfer executor turns these into status lines.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The SFTP subchannel could not be opened
    #[error("Failed to open transfer channel: {message}")]
    ChannelOpen { message: String },

    /// The remote side rejected or failed an SFTP request
    #[error("{0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    /// Local file I/O failed
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Errors in user-supplied configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Connection target not of the form user:password@host[:port]
    #[error("Invalid connection target '{target}': {message}")]
    InvalidTarget { target: String, message: String },

    /// Forwarding spec could not be parsed
    #[error("Invalid forward spec '{spec}': {message}")]
    InvalidForward { spec: String, message: String },
}

/// Result type alias using relaysh's Error.
pub type Result<T> = std::result::Result<T, Error>;
