use std::{sync::Arc, time::Duration};

use clipmesh_core::{Clipboard, CoreError, fingerprint};
use tokio::{sync::Mutex, time::MissedTickBehavior};
use tracing::{debug, warn};

// The lock is held across the clipboard call in both directions so a monitor
// tick and a received update never interleave.
#[derive(Debug, Clone, Default)]
pub struct SharedSnapshot {
    text: Arc<Mutex<String>>,
}

impl SharedSnapshot {
    pub async fn current(&self) -> Option<String> {
        let text = self.text.lock().await;
        (!text.is_empty()).then(|| text.clone())
    }

    pub(crate) async fn prime<C>(&self, clipboard: &C) -> Result<(), CoreError>
    where
        C: Clipboard + ?Sized,
    {
        let mut current = self.text.lock().await;
        let text = clipboard.read().await?;
        if !text.is_empty() {
            *current = text;
        }
        Ok(())
    }

    pub async fn observe<C>(&self, clipboard: &C) -> Result<Option<String>, CoreError>
    where
        C: Clipboard + ?Sized,
    {
        let mut current = self.text.lock().await;
        let text = clipboard.read().await?;
        if text.is_empty() || *current == text {
            return Ok(None);
        }
        *current = text.clone();
        Ok(Some(text))
    }

    pub async fn apply<C>(&self, clipboard: &C, text: &str) -> Result<bool, CoreError>
    where
        C: Clipboard + ?Sized,
    {
        let mut current = self.text.lock().await;
        if *current == text {
            return Ok(false);
        }
        clipboard.write(text).await?;
        *current = text.to_owned();
        Ok(true)
    }
}

pub async fn poll_loop<C, F>(
    clipboard: Arc<C>,
    snapshot: SharedSnapshot,
    interval: Duration,
    mut emit: F,
) where
    C: Clipboard + ?Sized,
    F: FnMut(String),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match snapshot.observe(clipboard.as_ref()).await {
            Ok(Some(text)) => {
                debug!(digest = %fingerprint(&text), "local clipboard changed");
                emit(text);
            }
            Ok(None) => {}
            Err(err) => warn!("clipboard read failed, retrying next tick: {}", err),
        }
    }
}
