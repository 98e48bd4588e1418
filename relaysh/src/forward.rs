//! Port forwarding (`-L` and `-R`).
//!
//! Plain socket relays over the SSH session. They share nothing with the
//! interactive shell.

use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info, warn};
use russh::Channel;
use russh::client::Msg;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{ConfigError, Result, TransportError};
use crate::transport::{RemoteForwardTarget, SshTransport};

/// Bind host used when a forward spec leaves it out.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// `-L [bind_address:]port:host:hostport`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalForward {
    pub bind_host: String,
    pub bind_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl FromStr for LocalForward {
    type Err = ConfigError;

    fn from_str(spec: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = spec.split(':').collect();
        let (bind_host, bind_port, remote_host, remote_port) = match parts.as_slice() {
            [port, host, hostport] => (DEFAULT_BIND_HOST, *port, *host, *hostport),
            [bind, port, host, hostport] => (*bind, *port, *host, *hostport),
            _ => {
                return Err(invalid_forward(spec, "expected [bind_address:]port:host:hostport"));
            }
        };

        if remote_host.is_empty() {
            return Err(invalid_forward(spec, "missing target host"));
        }

        Ok(Self {
            bind_host: non_empty_or_default(bind_host),
            bind_port: parse_port(spec, bind_port)?,
            remote_host: remote_host.to_string(),
            remote_port: parse_port(spec, remote_port)?,
        })
    }
}

/// `-R [host:]port`: the server listens on `host:port` and connections are
/// relayed to `host:port` on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteForward {
    pub host: String,
    pub port: u16,
}

impl RemoteForward {
    /// Where forwarded connections are relayed to.
    pub fn target(&self) -> RemoteForwardTarget {
        RemoteForwardTarget {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl FromStr for RemoteForward {
    type Err = ConfigError;

    fn from_str(spec: &str) -> std::result::Result<Self, Self::Err> {
        let (host, port) = match spec.rsplit_once(':') {
            Some((host, port)) => (non_empty_or_default(host), port),
            None => (DEFAULT_BIND_HOST.to_string(), spec),
        };

        Ok(Self {
            host,
            port: parse_port(spec, port)?,
        })
    }
}

fn invalid_forward(spec: &str, message: &str) -> ConfigError {
    ConfigError::InvalidForward {
        spec: spec.to_string(),
        message: message.to_string(),
    }
}

fn parse_port(spec: &str, port: &str) -> std::result::Result<u16, ConfigError> {
    port.parse()
        .map_err(|_| invalid_forward(spec, &format!("invalid port '{}'", port)))
}

fn non_empty_or_default(host: &str) -> String {
    if host.is_empty() {
        DEFAULT_BIND_HOST.to_string()
    } else {
        host.to_string()
    }
}

/// Accept local connections and relay each through a direct-tcpip channel.
///
/// Runs until accepting fails.
pub async fn serve_local(transport: Arc<SshTransport>, spec: LocalForward) -> Result<()> {
    let listener = TcpListener::bind((spec.bind_host.as_str(), spec.bind_port))
        .await
        .map_err(TransportError::Io)?;
    info!(
        "forwarding {}:{} -> {}:{}",
        spec.bind_host, spec.bind_port, spec.remote_host, spec.remote_port
    );

    loop {
        let (socket, peer) = listener.accept().await.map_err(TransportError::Io)?;
        debug!("accepted local connection from {}", peer);

        let transport = transport.clone();
        let spec = spec.clone();
        tokio::spawn(async move {
            let opened = transport
                .open_direct_tcpip(
                    &spec.remote_host,
                    spec.remote_port,
                    &peer.ip().to_string(),
                    peer.port(),
                )
                .await;
            match opened {
                Ok(channel) => relay(socket, channel).await,
                Err(e) => warn!(
                    "cannot reach {}:{} for {}: {}",
                    spec.remote_host, spec.remote_port, peer, e
                ),
            }
        });
    }
}

/// Relay a connection the server forwarded to us to the local target.
pub(crate) async fn relay_to_local(channel: Channel<Msg>, target: RemoteForwardTarget) {
    match TcpStream::connect((target.host.as_str(), target.port)).await {
        Ok(socket) => relay(socket, channel).await,
        Err(e) => {
            warn!("cannot connect to {}:{}: {}", target.host, target.port, e);
            let _ = channel.close().await;
        }
    }
}

async fn relay(mut socket: TcpStream, channel: Channel<Msg>) {
    let mut stream = channel.into_stream();
    match tokio::io::copy_bidirectional(&mut socket, &mut stream).await {
        Ok((sent, received)) => debug!("relay closed: {} bytes out, {} bytes in", sent, received),
        Err(e) => debug!("relay ended: {}", e),
    }
}
