//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use russh::Channel;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh_sftp::client::SftpSession;
use secrecy::{ExposeSecret, SecretString};

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use crate::channel::ShellChannel;
use crate::error::{ChannelError, Result, TransferError, TransportError};

/// Local endpoint that connections forwarded by the server (`-R`) are
/// relayed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteForwardTarget {
    /// Local host to connect to.
    pub host: String,
    /// Local port to connect to.
    pub port: u16,
}

/// SSH transport wrapping russh client.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        Self::connect_with_forward(config, None).await
    }

    /// Connect and relay server-initiated forwarded connections to `target`.
    pub async fn connect_with_forward(
        config: SshConfig,
        target: Option<RemoteForwardTarget>,
    ) -> Result<Self> {
        let credentials = Credentials::load(&config.auth)?;

        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
            remote_forward: target,
        };

        debug!("connecting to {}", config.socket_addr());

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // Prefer the detailed error recorded by check_server_key
            let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            stored.unwrap_or(TransportError::Ssh(e))
        })?;

        authenticate(&mut session, &config.username, credentials).await?;

        Ok(Self { session, config })
    }

    /// Open the interactive terminal channel: a session channel with a PTY
    /// and a login shell.
    pub async fn open_shell(&self) -> Result<ShellChannel> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(ChannelError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|_| ChannelError::PtyOpenFailed)?;

        channel
            .request_shell(true)
            .await
            .map_err(|_| ChannelError::ShellRequestFailed)?;

        Ok(ShellChannel::new(channel))
    }

    /// Open a fresh SFTP subchannel.
    ///
    /// Each transfer gets its own subchannel; callers close it when done.
    pub async fn open_sftp(&self) -> std::result::Result<SftpSession, TransferError> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(|e| TransferError::ChannelOpen {
                message: e.to_string(),
            })?;

        if let Err(e) = channel.request_subsystem(true, "sftp").await {
            let _ = channel.close().await;
            return Err(TransferError::ChannelOpen {
                message: e.to_string(),
            });
        }

        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| TransferError::ChannelOpen {
                message: e.to_string(),
            })
    }

    /// Open a direct-tcpip channel to `host:port` on behalf of a local peer.
    pub async fn open_direct_tcpip(
        &self,
        host: &str,
        port: u16,
        originator_address: &str,
        originator_port: u16,
    ) -> Result<Channel<Msg>> {
        let channel = self
            .session
            .channel_open_direct_tcpip(
                host,
                u32::from(port),
                originator_address,
                u32::from(originator_port),
            )
            .await
            .map_err(ChannelError::Ssh)?;
        Ok(channel)
    }

    /// Ask the server to listen on `address:port` and forward connections
    /// back over this session. Returns the port the server bound.
    pub async fn request_remote_forward(&mut self, address: &str, port: u16) -> Result<u32> {
        let bound = self
            .session
            .tcpip_forward(address, u32::from(port))
            .await
            .map_err(TransportError::Ssh)?;
        // Port 0 requests return the allocated port; explicit ports may return 0.
        Ok(if bound == 0 { u32::from(port) } else { bound })
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// What is presented to the server, loaded before any connection is made so
/// a bad key path fails fast.
enum Credentials {
    Password(SecretString),
    Key(PrivateKey),
}

impl Credentials {
    fn load(auth: &AuthMethod) -> Result<Self> {
        match auth {
            AuthMethod::Password(password) => Ok(Self::Password(password.clone())),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(format!("{}: {}", path.display(), e)))?;
                Ok(Self::Key(key))
            }
        }
    }
}

async fn authenticate(
    session: &mut Handle<SshHandler>,
    username: &str,
    credentials: Credentials,
) -> Result<()> {
    let accepted = match credentials {
        Credentials::Password(password) => session
            .authenticate_password(username, password.expose_secret())
            .await
            .map_err(TransportError::Ssh)?
            .success(),
        Credentials::Key(key) => {
            let hash_alg = session
                .best_supported_rsa_hash()
                .await
                .map_err(TransportError::Ssh)?
                .flatten();
            session
                .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                .await
                .map_err(TransportError::Ssh)?
                .success()
        }
    };

    if !accepted {
        return Err(TransportError::AuthenticationFailed {
            user: username.to_string(),
        }
        .into());
    }
    debug!("authenticated as {}", username);
    Ok(())
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Why the last host key was refused; russh itself only reports `UnknownKey`.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
    /// Where server-forwarded connections go, if `-R` was requested.
    remote_forward: Option<RemoteForwardTarget>,
}

impl SshHandler {
    /// Apply the host key policy to `key`.
    fn verify(&self, key: &PublicKey) -> std::result::Result<(), TransportError> {
        if self.host_key_verification == HostKeyVerification::Disabled {
            return Ok(());
        }

        let known = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, key),
        };
        match known {
            Ok(true) => Ok(()),
            Ok(false) if self.host_key_verification == HostKeyVerification::Strict => {
                Err(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                })
            }
            Ok(false) => {
                let learned = match &self.known_hosts_path {
                    Some(path) => russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, key, path),
                    None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, key),
                };
                match learned {
                    Ok(()) => debug!("recorded host key for {}:{}", self.host, self.port),
                    Err(e) => warn!("could not record host key for {}:{}: {}", self.host, self.port, e),
                }
                Ok(())
            }
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.verify(server_public_key) {
            Ok(()) => Ok(true),
            Err(e) => Ok(self.reject(e)),
        }
    }

    async fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> std::result::Result<(), Self::Error> {
        let Some(target) = self.remote_forward.clone() else {
            warn!(
                "Unexpected forwarded connection for {}:{}, closing",
                connected_address, connected_port
            );
            let _ = channel.close().await;
            return Ok(());
        };

        debug!(
            "forwarded connection {}:{} from {}:{} -> {}:{}",
            connected_address,
            connected_port,
            originator_address,
            originator_port,
            target.host,
            target.port
        );
        tokio::spawn(crate::forward::relay_to_local(channel, target));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_missing_key_fails_before_connecting() {
        let auth = AuthMethod::PrivateKey {
            path: PathBuf::from("/nonexistent/relaysh/id_ed25519"),
            passphrase: None,
        };
        match Credentials::load(&auth) {
            Err(crate::Error::Transport(TransportError::Key(message))) => {
                assert!(message.starts_with("/nonexistent/relaysh/id_ed25519: "));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("key should not load"),
        }
    }

    #[test]
    fn test_password_credentials() {
        let auth = AuthMethod::Password(SecretString::from("pw".to_string()));
        assert!(matches!(Credentials::load(&auth), Ok(Credentials::Password(p)) if p.expose_secret() == "pw"));
    }

    #[test]
    fn test_disabled_verification_accepts_any_key() {
        let handler = SshHandler {
            host: "10.8.0.22".to_string(),
            port: 22,
            host_key_verification: HostKeyVerification::Disabled,
            known_hosts_path: Some(PathBuf::from("/nonexistent/known_hosts")),
            host_key_error: Arc::new(Mutex::new(None)),
            remote_forward: None,
        };
        let key = PublicKey::from_openssh(
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIJdD7y3aLq454yWBdwLWbieU1ebz9/cu7/QEXn9OIeZJ",
        )
        .unwrap();
        assert!(handler.verify(&key).is_ok());
    }
}
