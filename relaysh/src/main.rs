//! relaysh: interactive SSH shell with in-session `get` / `put`.
//!
//! # Usage
//!
//! ```bash
//! relaysh root:secret@10.8.0.22:22 -w ./downloads
//! relaysh root:secret@10.8.0.22 -L 3001:localhost:3000
//! relaysh root:secret@10.8.0.22 -R 8080
//! ```
//!
//! Set `RUST_LOG=debug` for diagnostics on stderr.

use std::process;
use std::sync::Arc;

use clap::Parser;
use log::debug;

use relaysh::cli::{Cli, Mode};
use relaysh::error::TransportError;
use relaysh::forward::{self, LocalForward, RemoteForward};
use relaysh::intercept::{ConsoleStatus, InteractiveShell, SftpTransfer};
use relaysh::terminal::{self, RawModeGuard};
use relaysh::{Result, SshTransport};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => process::exit(code as i32),
        Err(e) => {
            eprintln!("relaysh: {}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<u32> {
    match cli.mode() {
        Mode::Shell => shell(&cli).await,
        Mode::LocalForward(spec) => local_forward(&cli, spec).await.map(|()| 0),
        Mode::RemoteForward(spec) => remote_forward(&cli, spec).await.map(|()| 0),
    }
}

async fn shell(cli: &Cli) -> Result<u32> {
    let mut config = cli.ssh_config()?;
    (config.terminal_width, config.terminal_height) = terminal::size();

    let transport = Arc::new(SshTransport::connect(config).await?);
    let channel = transport.open_shell().await?;

    let shell = InteractiveShell::new(
        channel,
        SftpTransfer::new(transport.clone()),
        ConsoleStatus,
        &cli.intercept_config(),
    );

    let code = {
        let _raw = RawModeGuard::enter().map_err(TransportError::Io)?;
        shell
            .run(tokio::io::stdin(), tokio::io::stdout(), tokio::io::stderr())
            .await?
    };

    if let Err(e) = transport.close().await {
        debug!("disconnect failed: {}", e);
    }
    Ok(code)
}

async fn local_forward(cli: &Cli, spec: LocalForward) -> Result<()> {
    let transport = Arc::new(SshTransport::connect(cli.ssh_config()?).await?);

    println!("Listening for connections {}:{}", spec.bind_host, spec.bind_port);

    tokio::select! {
        served = forward::serve_local(transport.clone(), spec) => served?,
        _ = tokio::signal::ctrl_c() => debug!("interrupted"),
    }

    transport.close().await
}

async fn remote_forward(cli: &Cli, spec: RemoteForward) -> Result<()> {
    let mut transport = SshTransport::connect_with_forward(cli.ssh_config()?, Some(spec.target())).await?;
    let port = transport.request_remote_forward(&spec.host, spec.port).await?;

    println!("Listening for connections from server on port {}", port);

    tokio::signal::ctrl_c().await.map_err(TransportError::Io)?;
    debug!("interrupted");

    transport.close().await
}
