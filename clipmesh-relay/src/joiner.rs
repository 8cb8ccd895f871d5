use clipmesh_core::{Clipboard, CoreError};
use tokio::{io::BufReader, net::TcpStream};
use tracing::{debug, info};

use crate::{
    Node,
    connection::{Disconnect, Role, run_connection},
};

pub async fn join<C: Clipboard>(target: &str, node: Node<C>) -> Result<Disconnect, CoreError> {
    let stream = TcpStream::connect(target).await?;
    let peer = stream.peer_addr()?;
    info!(%peer, "connected to hub");
    if let Err(err) = stream.set_nodelay(true) {
        debug!(%peer, "set_nodelay failed: {}", err);
    }

    let (read_half, write_half) = stream.into_split();
    let end = run_connection(
        node,
        peer,
        BufReader::new(read_half),
        write_half,
        Role::Joiner,
    )
    .await;
    end.report(peer);
    Ok(end)
}
