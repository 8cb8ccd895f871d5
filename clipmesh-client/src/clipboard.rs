use arboard::Clipboard as OsClipboard;
use async_trait::async_trait;
use clipmesh_core::{Clipboard, CoreError};

#[derive(Debug)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Result<Self, CoreError> {
        OsClipboard::new().map_err(|err| CoreError::ClipboardRead(err.to_string()))?;
        Ok(Self)
    }
}

#[async_trait]
impl Clipboard for SystemClipboard {
    async fn read(&self) -> Result<String, CoreError> {
        tokio::task::spawn_blocking(|| {
            let mut clipboard =
                OsClipboard::new().map_err(|err| CoreError::ClipboardRead(err.to_string()))?;
            match clipboard.get_text() {
                Ok(text) => Ok(text),
                // non-text or empty clipboard; the monitor skips empty reads
                Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
                Err(err) => Err(CoreError::ClipboardRead(err.to_string())),
            }
        })
        .await
        .map_err(|err| CoreError::ClipboardRead(err.to_string()))?
    }

    async fn write(&self, text: &str) -> Result<(), CoreError> {
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || {
            let mut clipboard =
                OsClipboard::new().map_err(|err| CoreError::ClipboardWrite(err.to_string()))?;
            clipboard
                .set_text(text)
                .map_err(|err| CoreError::ClipboardWrite(err.to_string()))
        })
        .await
        .map_err(|err| CoreError::ClipboardWrite(err.to_string()))?
    }
}
