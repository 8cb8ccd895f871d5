mod connection;
mod hub;
mod joiner;
mod monitor;
mod registry;

use std::{io, sync::Arc, time::Duration};

use bytes::Bytes;
use clipmesh_core::{Clipboard, CoreError, KdfParams, SharedSecret, decrypt, encrypt};
use tokio::{
    sync::broadcast,
    task::{JoinError, JoinHandle},
};
use tracing::warn;

pub use connection::{Disconnect, Role, run_connection};
pub use hub::serve;
pub use joiner::join;
pub use monitor::{SharedSnapshot, poll_loop};
pub use registry::{
    BroadcastReport, OUTBOUND_QUEUE_CAPACITY, PeerHandle, PeerIndex, PeerRegistry,
};

const CHANGE_FEED_CAPACITY: usize = 16;

// both ends must agree, nothing on the wire says which is in use
#[derive(Debug, Clone)]
pub enum Security {
    Plaintext,
    Encrypted {
        secret: SharedSecret,
        kdf: KdfParams,
    },
}

impl Security {
    pub fn encrypted(secret: SharedSecret) -> Self {
        Self::Encrypted {
            secret,
            kdf: KdfParams::default(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Security::Encrypted { .. })
    }

    pub(crate) async fn seal(&self, text: &str) -> Result<Bytes, CoreError> {
        match self {
            Security::Plaintext => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Security::Encrypted { secret, kdf } => {
                let secret = secret.clone();
                let kdf = *kdf;
                let plaintext = text.as_bytes().to_vec();
                // argon2 runs on the blocking pool
                let sealed = tokio::task::spawn_blocking(move || {
                    encrypt(secret.as_bytes(), &plaintext, &kdf)
                })
                .await
                .map_err(join_error)??;
                Ok(Bytes::from(sealed))
            }
        }
    }

    pub(crate) async fn open(&self, payload: Bytes) -> Result<String, CoreError> {
        let plaintext = match self {
            Security::Plaintext => payload.to_vec(),
            Security::Encrypted { secret, kdf } => {
                let secret = secret.clone();
                let kdf = *kdf;
                tokio::task::spawn_blocking(move || decrypt(secret.as_bytes(), &payload, &kdf))
                    .await
                    .map_err(join_error)??
            }
        };
        String::from_utf8(plaintext).map_err(|_| CoreError::NonUtf8Text)
    }
}

fn join_error(err: JoinError) -> CoreError {
    CoreError::Io(io::Error::other(err))
}

pub struct Node<C> {
    inner: Arc<NodeInner<C>>,
}

struct NodeInner<C> {
    clipboard: Arc<C>,
    security: Security,
    snapshot: SharedSnapshot,
    changes: broadcast::Sender<Arc<str>>,
}

impl<C> Clone for Node<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clipboard> Node<C> {
    pub fn new(clipboard: Arc<C>, security: Security) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(NodeInner {
                clipboard,
                security,
                snapshot: SharedSnapshot::default(),
                changes,
            }),
        }
    }

    pub fn security(&self) -> &Security {
        &self.inner.security
    }

    pub fn snapshot(&self) -> &SharedSnapshot {
        &self.inner.snapshot
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.inner.changes.subscribe()
    }

    pub async fn start_monitor(&self, interval: Duration) -> JoinHandle<()> {
        if let Err(err) = self.inner.snapshot.prime(self.inner.clipboard.as_ref()).await {
            warn!("initial clipboard read failed: {}", err);
        }

        let clipboard = Arc::clone(&self.inner.clipboard);
        let snapshot = self.inner.snapshot.clone();
        let changes = self.inner.changes.clone();
        tokio::spawn(poll_loop(clipboard, snapshot, interval, move |text| {
            // no subscribers just means no peer is connected yet
            let _ = changes.send(Arc::from(text));
        }))
    }

    pub(crate) async fn apply_remote(&self, text: &str) -> Result<bool, CoreError> {
        self.inner
            .snapshot
            .apply(self.inner.clipboard.as_ref(), text)
            .await
    }
}
