use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::{
    Mutex,
    mpsc::{self, error::TrySendError},
};
use tracing::warn;

pub type PeerIndex = usize;

// frames waiting for one peer's writer; a peer that stops reading caps here
pub const OUTBOUND_QUEUE_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
pub struct PeerHandle {
    peer: SocketAddr,
    tx: mpsc::Sender<Bytes>,
}

impl PeerHandle {
    pub fn new(peer: SocketAddr, tx: mpsc::Sender<Bytes>) -> Self {
        Self { peer, tx }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub tombstoned: usize,
}

// Slots are never removed, so indexes stay stable. A closed queue tombstones
// its slot for good; a full one only loses the current frame.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    slots: Mutex<Vec<Option<PeerHandle>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: PeerHandle) -> PeerIndex {
        let mut slots = self.slots.lock().await;
        slots.push(Some(handle));
        slots.len() - 1
    }

    pub async fn broadcast(&self, payload: Bytes, origin: Option<PeerIndex>) -> BroadcastReport {
        let mut slots = self.slots.lock().await;
        let mut report = BroadcastReport::default();

        for (index, slot) in slots.iter_mut().enumerate() {
            if origin == Some(index) {
                continue;
            }
            let Some(handle) = slot.as_ref() else {
                continue;
            };

            match handle.tx.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        peer = %handle.peer,
                        index,
                        "peer is not keeping up, dropping relayed clipboard"
                    );
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(
                        peer = %handle.peer,
                        index,
                        "failed to send clipboard to peer, it will not be contacted again"
                    );
                    *slot = None;
                    report.tombstoned += 1;
                }
            }
        }

        report
    }

    pub async fn live_peers(&self) -> usize {
        self.slots.lock().await.iter().flatten().count()
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}
