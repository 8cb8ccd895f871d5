use std::{sync::Arc, time::Duration};

use clipmesh_core::Clipboard;
use tokio::{io::BufReader, net::TcpListener};
use tracing::{debug, info, warn};

use crate::{
    Node,
    connection::{Role, run_connection},
    registry::PeerRegistry,
};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub async fn serve<C: Clipboard>(
    listener: TcpListener,
    node: Node<C>,
    registry: Arc<PeerRegistry>,
) {
    info!(
        "hub listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned())
    );

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("accept failed: {}", err);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        info!(%peer, "peer connected");
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {}", err);
        }

        let node = node.clone();
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            let end = run_connection(
                node,
                peer,
                BufReader::new(read_half),
                write_half,
                Role::Hub(registry),
            )
            .await;
            end.report(peer);
        });
    }
}
