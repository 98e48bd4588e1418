//! Command-line interface.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;

use crate::error::{ConfigError, Result};
use crate::forward::{LocalForward, RemoteForward};
use crate::intercept::InterceptConfig;
use crate::transport::{AuthMethod, HostKeyVerification, SshConfig};

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Interactive SSH shell with in-session `get` / `put` file transfers.
#[derive(Parser, Debug)]
#[command(name = "relaysh", version, after_help = "In-session commands:\n  get <remote> [local]   download a file\n  put <local> [remote]   upload a file")]
pub struct Cli {
    /// <username>:<password>@<host>[:<port>]
    pub target: Target,

    /// Forward connections on the server's [host:]port back to host:port here
    #[arg(short = 'R', value_name = "[HOST:]PORT", conflicts_with = "local")]
    pub remote: Option<RemoteForward>,

    /// Forward [bind_address:]port here to host:hostport via the server
    #[arg(short = 'L', value_name = "[BIND:]PORT:HOST:HOSTPORT")]
    pub local: Option<LocalForward>,

    /// Local directory for downloads; also stands in for a remote `~`
    #[arg(short = 'w', long, default_value = "./")]
    pub work_dir: PathBuf,

    /// Milliseconds to wait after a transfer before restoring output
    #[arg(long, default_value_t = 1000)]
    pub settle_ms: u64,

    /// Authenticate with this private key instead of the password
    #[arg(short = 'i', long)]
    pub key: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Refuse hosts missing from known_hosts
    #[arg(long, conflicts_with = "no_host_key_check")]
    pub strict_host_key: bool,

    /// Skip host key verification entirely
    #[arg(long)]
    pub no_host_key_check: bool,
}

/// What the process does once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Shell,
    LocalForward(LocalForward),
    RemoteForward(RemoteForward),
}

impl Cli {
    pub fn mode(&self) -> Mode {
        match (&self.remote, &self.local) {
            (Some(remote), _) => Mode::RemoteForward(remote.clone()),
            (None, Some(local)) => Mode::LocalForward(local.clone()),
            (None, None) => Mode::Shell,
        }
    }

    /// Build the SSH configuration from the target and flags.
    pub fn ssh_config(&self) -> Result<SshConfig> {
        let auth = match (&self.key, &self.target.password) {
            (Some(path), passphrase) => AuthMethod::PrivateKey {
                path: path.clone(),
                passphrase: passphrase.clone(),
            },
            (None, Some(password)) => AuthMethod::Password(password.clone()),
            (None, None) => {
                return Err(ConfigError::InvalidTarget {
                    target: self.target.to_string(),
                    message: "a password or --key is required".to_string(),
                }
                .into());
            }
        };

        let mut config = SshConfig::new(&self.target.host, self.target.port, &self.target.username, auth);
        config.timeout = Duration::from_secs(self.timeout);
        config.host_key_verification = if self.no_host_key_check {
            HostKeyVerification::Disabled
        } else if self.strict_host_key {
            HostKeyVerification::Strict
        } else {
            HostKeyVerification::AcceptNew
        };
        Ok(config)
    }

    pub fn intercept_config(&self) -> InterceptConfig {
        InterceptConfig {
            work_dir: self.work_dir.clone(),
            settle_delay: Duration::from_millis(self.settle_ms),
            ..InterceptConfig::default()
        }
    }
}

/// `<username>[:<password>]@<host>[:<port>]`
#[derive(Debug, Clone)]
pub struct Target {
    pub username: String,
    pub password: Option<SecretString>,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

impl FromStr for Target {
    type Err = ConfigError;

    fn from_str(target: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |message: &str| ConfigError::InvalidTarget {
            // Never echo the password back
            target: target
                .rsplit_once('@')
                .map(|(_, host)| host.to_string())
                .unwrap_or_default(),
            message: message.to_string(),
        };

        let (credentials, endpoint) = target
            .rsplit_once('@')
            .ok_or_else(|| invalid("expected <username>:<password>@<host>[:<port>]"))?;

        let (username, password) = match credentials.split_once(':') {
            Some((username, password)) => (username, Some(password)),
            None => (credentials, None),
        };
        if username.is_empty() {
            return Err(invalid("missing username"));
        }

        let (host, port) = match endpoint.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse().map_err(|_| invalid(&format!("invalid port '{}'", port)))?,
            ),
            None => (endpoint, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            username: username.to_string(),
            password: password.map(|p| SecretString::from(p.to_string())),
            host: host.to_string(),
            port,
        })
    }
}
