pub mod cli;
pub mod clipboard;
pub mod net;
pub mod prompt;

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use clipmesh_core::{Clipboard, CoreError, SharedSecret};
use clipmesh_relay::{Node, PeerRegistry, Security, join, serve};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub use cli::{ClientArgs, ClientConfig, Mode};
pub use clipboard::SystemClipboard;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("could not connect to {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: CoreError,
    },
    #[error("failed to read password: {0}")]
    Password(#[source] io::Error),
    #[error("clipboard unavailable: {0}")]
    Clipboard(#[source] CoreError),
}

pub fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

pub async fn run(config: ClientConfig) -> Result<(), ClientError> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "clipmesh starting"
    );

    let security = if config.encrypt {
        Security::encrypted(read_secret().await?)
    } else {
        warn!("encryption disabled, clipboard contents travel in plaintext");
        Security::Plaintext
    };

    let clipboard = Arc::new(SystemClipboard::new().map_err(ClientError::Clipboard)?);
    let node = Node::new(clipboard, security);
    info!(encrypted = node.security().is_encrypted(), "clipboard relay ready");

    match config.mode {
        Mode::Hub { bind } => run_hub(bind, node, config.interval).await,
        Mode::Join { target } => run_joiner(&target, node, config.interval).await,
    }
}

async fn read_secret() -> Result<SharedSecret, ClientError> {
    let password =
        tokio::task::spawn_blocking(|| prompt::read_password("Password for --encrypt: "))
            .await
            .map_err(|err| ClientError::Password(io::Error::other(err)))?
            .map_err(ClientError::Password)?;

    let secret = SharedSecret::new(password);
    if secret.is_empty() {
        warn!("empty password, anyone on the network can read and inject updates");
    }
    Ok(secret)
}

pub async fn run_hub<C: Clipboard>(
    bind: SocketAddr,
    node: Node<C>,
    interval: Duration,
) -> Result<(), ClientError> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|source| ClientError::Bind { addr: bind, source })?;
    let port = listener
        .local_addr()
        .map_or(bind.port(), |addr| addr.port());
    let host = net::outbound_ip().unwrap_or(bind.ip());
    info!("{}", cli::join_hint(host, port));

    let _monitor = node.start_monitor(interval).await;
    serve(listener, node, Arc::new(PeerRegistry::new())).await;
    Ok(())
}

pub async fn run_joiner<C: Clipboard>(
    target: &str,
    node: Node<C>,
    interval: Duration,
) -> Result<(), ClientError> {
    let monitor = node.start_monitor(interval).await;
    let result = join(target, node).await;
    monitor.abort();

    result.map_err(|source| ClientError::Dial {
        target: target.to_owned(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clipmesh_core::MemoryClipboard;

    use super::*;

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let node = Node::new(Arc::new(MemoryClipboard::default()), Security::Plaintext);

        let err = run_hub(addr, node, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Bind { addr: got, .. } if got == addr));
    }

    #[tokio::test]
    async fn unreachable_hub_is_a_dial_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let node = Node::new(Arc::new(MemoryClipboard::default()), Security::Plaintext);

        let err = run_joiner(&addr.to_string(), node, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Dial { .. }));
        assert!(err.to_string().starts_with("could not connect to"));
    }
}
