use std::{io, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use clipmesh_core::{Clipboard, CoreError, fingerprint, read_frame, write_frame};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    Node,
    registry::{OUTBOUND_QUEUE_CAPACITY, PeerHandle, PeerIndex, PeerRegistry},
};

#[derive(Debug, Clone)]
pub enum Role {
    Joiner,
    Hub(Arc<PeerRegistry>),
}

#[derive(Debug)]
pub enum Disconnect {
    PeerClosed,
    ReadFailed(CoreError),
    WriteFailed(CoreError),
    OutboundClosed,
}

impl Disconnect {
    pub fn report(&self, peer: SocketAddr) {
        match self {
            Disconnect::PeerClosed => info!(%peer, "peer disconnected"),
            Disconnect::ReadFailed(err) => warn!(%peer, "read from peer failed: {}", err),
            Disconnect::WriteFailed(err) => warn!(%peer, "write to peer failed: {}", err),
            Disconnect::OutboundClosed => info!(%peer, "outbound queue closed"),
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub async fn run_connection<C, R, W>(
    node: Node<C>,
    peer: SocketAddr,
    reader: R,
    writer: W,
    role: Role,
) -> Disconnect
where
    C: Clipboard,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_CAPACITY);

    let relay = match role {
        Role::Hub(registry) => {
            let index = registry
                .register(PeerHandle::new(peer, outbound_tx.clone()))
                .await;
            debug!(%peer, index, "peer registered");
            Some((registry, index))
        }
        Role::Joiner => None,
    };

    // a hub hands its current clipboard to every newly accepted peer
    let initial_sync = relay.is_some();

    let mut write_task = AbortOnDrop(tokio::spawn(write_loop(writer, outbound_rx)));
    let _send_task = AbortOnDrop(tokio::spawn(send_loop(
        node.clone(),
        peer,
        outbound_tx,
        initial_sync,
    )));

    tokio::select! {
        end = receive_loop(&node, peer, reader, relay) => end,
        joined = &mut write_task.0 => match joined {
            Ok(Ok(())) => Disconnect::OutboundClosed,
            Ok(Err(err)) => Disconnect::WriteFailed(err),
            Err(err) => Disconnect::WriteFailed(CoreError::Io(io::Error::other(err))),
        },
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Bytes>,
) -> Result<(), CoreError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(payload) = outbound.recv().await {
        match write_frame(&mut writer, &payload).await {
            Ok(()) => {}
            Err(CoreError::FrameTooLarge(len)) => {
                warn!("dropping outbound clipboard of {} bytes", len);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

async fn send_loop<C: Clipboard>(
    node: Node<C>,
    peer: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    initial_sync: bool,
) {
    let mut changes = node.subscribe();

    if initial_sync
        && let Some(current) = node.snapshot().current().await
        && !push(&node, peer, &outbound, &current).await
    {
        return;
    }

    loop {
        match changes.recv().await {
            Ok(text) => {
                if !push(&node, peer, &outbound, &text).await {
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(%peer, skipped, "sender fell behind, older local changes skipped");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

async fn push<C: Clipboard>(
    node: &Node<C>,
    peer: SocketAddr,
    outbound: &mpsc::Sender<Bytes>,
    text: &str,
) -> bool {
    match node.security().seal(text).await {
        Ok(payload) => {
            debug!(%peer, digest = %fingerprint(text), "sending clipboard");
            // waits for queue room, so a slow peer only stalls its own sender
            outbound.send(payload).await.is_ok()
        }
        Err(err) => {
            warn!(%peer, "failed to seal clipboard update: {}", err);
            true
        }
    }
}

async fn receive_loop<C, R>(
    node: &Node<C>,
    peer: SocketAddr,
    mut reader: R,
    relay: Option<(Arc<PeerRegistry>, PeerIndex)>,
) -> Disconnect
where
    C: Clipboard,
    R: AsyncRead + Unpin,
{
    loop {
        let payload = match read_frame(&mut reader).await {
            Ok(payload) => payload,
            Err(CoreError::EndOfStream) => return Disconnect::PeerClosed,
            Err(CoreError::FrameTooLarge(len)) => {
                warn!(%peer, len, "skipped oversized frame");
                continue;
            }
            Err(err) => return Disconnect::ReadFailed(err),
        };

        let text = match node.security().open(payload.clone()).await {
            Ok(text) => text,
            Err(err) if err.is_crypto() => {
                warn!(%peer, "dropping frame that failed decryption: {}", err);
                continue;
            }
            Err(err) => {
                warn!(%peer, "dropping malformed frame: {}", err);
                continue;
            }
        };

        if text.is_empty() {
            debug!(%peer, "ignoring empty clipboard update");
            continue;
        }

        let digest = fingerprint(&text);
        match node.apply_remote(&text).await {
            Ok(true) => debug!(%peer, %digest, "applied remote clipboard"),
            Ok(false) => {
                debug!(%peer, %digest, "remote clipboard already current");
                continue;
            }
            Err(err) => warn!(%peer, "failed to apply remote clipboard: {}", err),
        }

        if let Some((registry, origin)) = &relay {
            let report = registry.broadcast(payload, Some(*origin)).await;
            debug!(
                %peer,
                %digest,
                delivered = report.delivered,
                dropped = report.dropped,
                tombstoned = report.tombstoned,
                "relayed clipboard"
            );
        }
    }
}
