use std::{fmt, io, sync::Arc};

use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use chacha20poly1305::{
    KeyInit, XChaCha20Poly1305,
    aead::{Aead, Payload, generic_array::GenericArray},
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
// nonce, tag and salt around an empty message
pub const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN + SALT_LEN;
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_PORT: u16 = 38551;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("sealed payload is {len} bytes, minimum is {min}")]
    MalformedInput { len: usize, min: usize },
    #[error("payload failed authentication (tampered or wrong password)")]
    Authentication,
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("stream closed")]
    EndOfStream,
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
    #[error("clipboard payload is not valid utf-8")]
    NonUtf8Text,
    #[error("clipboard read failed: {0}")]
    ClipboardRead(String),
    #[error("clipboard write failed: {0}")]
    ClipboardWrite(String),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    pub fn is_crypto(&self) -> bool {
        matches!(
            self,
            CoreError::MalformedInput { .. }
                | CoreError::Authentication
                | CoreError::KeyDerivation(_)
                | CoreError::EncryptionFailed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub mem_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_kib: 16 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    fn argon2(&self) -> Result<Argon2<'static>, CoreError> {
        let params = Params::new(
            self.mem_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|err| CoreError::KeyDerivation(err.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

#[derive(Clone)]
pub struct SharedSecret(Arc<Zeroizing<Vec<u8>>>);

impl SharedSecret {
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(Zeroizing::new(password.into())))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

pub fn derive_key(
    password: &[u8],
    salt: Option<[u8; SALT_LEN]>,
    params: &KdfParams,
) -> Result<(Zeroizing<[u8; KEY_LEN]>, [u8; SALT_LEN]), CoreError> {
    let salt = salt.unwrap_or_else(|| {
        let mut fresh = [0_u8; SALT_LEN];
        rand::rng().fill_bytes(&mut fresh);
        fresh
    });

    let mut key = Zeroizing::new([0_u8; KEY_LEN]);
    params
        .argon2()?
        .hash_password_into(password, &salt, key.as_mut_slice())
        .map_err(|err| CoreError::KeyDerivation(err.to_string()))?;
    Ok((key, salt))
}

// nonce || ciphertext || tag || salt, with the nonce as associated data
pub fn encrypt(
    password: &[u8],
    plaintext: &[u8],
    params: &KdfParams,
) -> Result<Vec<u8>, CoreError> {
    let (key, salt) = derive_key(password, None, params)?;
    let mut nonce = [0_u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_slice()));
    let sealed = cipher
        .encrypt(
            GenericArray::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &nonce,
            },
        )
        .map_err(|_| CoreError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len() + SALT_LEN);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    out.extend_from_slice(&salt);
    Ok(out)
}

pub fn decrypt(password: &[u8], blob: &[u8], params: &KdfParams) -> Result<Vec<u8>, CoreError> {
    if blob.len() < MIN_SEALED_LEN {
        return Err(CoreError::MalformedInput {
            len: blob.len(),
            min: MIN_SEALED_LEN,
        });
    }

    let (body, salt) = blob.split_at(blob.len() - SALT_LEN);
    let salt: [u8; SALT_LEN] = salt.try_into().map_err(|_| CoreError::MalformedInput {
        len: blob.len(),
        min: MIN_SEALED_LEN,
    })?;
    let (key, _) = derive_key(password, Some(salt), params)?;

    let (nonce, sealed) = body.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_slice()));
    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: nonce,
            },
        )
        .map_err(|_| CoreError::Authentication)
}

pub fn encode_frame(payload: &[u8]) -> Result<Bytes, CoreError> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(CoreError::FrameTooLarge(payload.len()));
    }
    let len = u32::try_from(payload.len()).map_err(|_| CoreError::FrameTooLarge(payload.len()))?;

    let mut out = BytesMut::with_capacity(4 + payload.len());
    out.put_u32_le(len);
    out.extend_from_slice(payload);
    Ok(out.freeze())
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), CoreError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, CoreError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32_le().await.map_err(eof_as_end)? as usize;

    if len > MAX_FRAME_BYTES {
        // drain it so the next length prefix lines up
        let mut oversized = reader.take(len as u64);
        let drained = tokio::io::copy(&mut oversized, &mut tokio::io::sink()).await?;
        if drained < len as u64 {
            return Err(CoreError::EndOfStream);
        }
        return Err(CoreError::FrameTooLarge(len));
    }

    let payload = read_payload(reader, len).await?;
    if payload.len() < len {
        return Err(CoreError::EndOfStream);
    }
    Ok(Bytes::from(payload))
}

// grows with the bytes that actually arrive rather than the declared length
async fn read_payload<R>(reader: &mut R, len: usize) -> Result<Vec<u8>, CoreError>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::new();
    reader.take(len as u64).read_to_end(&mut payload).await?;
    Ok(payload)
}

fn eof_as_end(err: io::Error) -> CoreError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        CoreError::EndOfStream
    } else {
        CoreError::Io(err)
    }
}

#[async_trait]
pub trait Clipboard: Send + Sync + 'static {
    async fn read(&self) -> Result<String, CoreError>;
    async fn write(&self, text: &str) -> Result<(), CoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryClipboard {
    text: Mutex<String>,
}

impl MemoryClipboard {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
        }
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn read(&self) -> Result<String, CoreError> {
        Ok(self.text.lock().await.clone())
    }

    async fn write(&self, text: &str) -> Result<(), CoreError> {
        *self.text.lock().await = text.to_owned();
        Ok(())
    }
}

pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: KdfParams = KdfParams {
        mem_kib: 64,
        iterations: 1,
        parallelism: 1,
    };

    #[test]
    fn encryption_roundtrip() {
        let large = [0xAB_u8; 4096];
        let cases: [&[u8]; 4] = [b"", b"hello", "héllo wörld".as_bytes(), &large];
        for plaintext in cases {
            let sealed = encrypt(b"secret", plaintext, &FAST).unwrap();
            assert_eq!(sealed.len(), plaintext.len() + MIN_SEALED_LEN);
            assert_eq!(decrypt(b"secret", &sealed, &FAST).unwrap(), plaintext);
        }
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let sealed = encrypt(b"secret", b"hello", &FAST).unwrap();
        let err = decrypt(b"not-the-secret", &sealed, &FAST).unwrap_err();
        assert!(matches!(err, CoreError::Authentication), "got {err:?}");
    }

    #[test]
    fn tampered_blob_fails_authentication() {
        let mut sealed = encrypt(b"secret", b"hello", &FAST).unwrap();
        sealed[NONCE_LEN] ^= 0x01;
        assert!(matches!(
            decrypt(b"secret", &sealed, &FAST),
            Err(CoreError::Authentication)
        ));

        let mut sealed = encrypt(b"secret", b"hello", &FAST).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x80;
        assert!(matches!(
            decrypt(b"secret", &sealed, &FAST),
            Err(CoreError::Authentication)
        ));
    }

    #[test]
    fn short_blobs_are_malformed() {
        for len in 0..MIN_SEALED_LEN {
            let blob = vec![7_u8; len];
            match decrypt(b"secret", &blob, &FAST) {
                Err(CoreError::MalformedInput { len: got, min }) => {
                    assert_eq!(got, len);
                    assert_eq!(min, MIN_SEALED_LEN);
                }
                other => panic!("unexpected result for {len} bytes: {other:?}"),
            }
        }
    }

    #[test]
    fn salt_and_nonce_are_fresh_per_message() {
        let first = encrypt(b"secret", b"same text", &FAST).unwrap();
        let second = encrypt(b"secret", b"same text", &FAST).unwrap();
        assert_ne!(first[..NONCE_LEN], second[..NONCE_LEN]);
        assert_ne!(
            first[first.len() - SALT_LEN..],
            second[second.len() - SALT_LEN..]
        );
    }

    #[test]
    fn key_derivation_is_deterministic_for_a_salt() {
        let (key_1, salt) = derive_key(b"secret", None, &FAST).unwrap();
        let (key_2, salt_2) = derive_key(b"secret", Some(salt), &FAST).unwrap();
        assert_eq!(salt, salt_2);
        assert_eq!(*key_1, *key_2);

        let (key_3, _) = derive_key(b"other", Some(salt), &FAST).unwrap();
        assert_ne!(*key_1, *key_3);
    }

    #[test]
    fn invalid_kdf_params_are_reported() {
        let params = KdfParams {
            mem_kib: 1,
            iterations: 1,
            parallelism: 1,
        };
        assert!(matches!(
            encrypt(b"secret", b"hello", &params),
            Err(CoreError::KeyDerivation(_))
        ));
    }

    #[tokio::test]
    async fn frame_roundtrip_preserves_boundaries() {
        let large = vec![0x5A_u8; 100 * 1024];
        let payloads: [&[u8]; 3] = [b"", b"hello", &large];

        let mut wire = Vec::new();
        for payload in payloads {
            write_frame(&mut wire, payload).await.unwrap();
        }

        let mut reader = wire.as_slice();
        for payload in payloads {
            assert_eq!(read_frame(&mut reader).await.unwrap(), payload);
        }
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(CoreError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn truncated_frame_is_end_of_stream() {
        let frame = encode_frame(b"hello world").unwrap();
        let mut reader = &frame[..frame.len() - 3];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(CoreError::EndOfStream)
        ));

        let mut header_only = &frame[..2];
        assert!(matches!(
            read_frame(&mut header_only).await,
            Err(CoreError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn oversized_frame_is_skipped() {
        let oversized = MAX_FRAME_BYTES + 1;
        let mut wire = Vec::with_capacity(oversized + 64);
        wire.extend_from_slice(&(oversized as u32).to_le_bytes());
        wire.resize(4 + oversized, 0);
        write_frame(&mut wire, b"after").await.unwrap();

        let mut reader = wire.as_slice();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(CoreError::FrameTooLarge(len)) if len == oversized
        ));
        assert_eq!(read_frame(&mut reader).await.unwrap(), &b"after"[..]);
    }

    #[tokio::test]
    async fn declared_length_is_not_reserved_up_front() {
        let mut reader: &[u8] = b"abc";
        let payload = read_payload(&mut reader, MAX_FRAME_BYTES).await.unwrap();
        assert_eq!(payload, b"abc");
        assert!(payload.capacity() < 64 * 1024, "{}", payload.capacity());

        let mut wire = (MAX_FRAME_BYTES as u32).to_le_bytes().to_vec();
        wire.extend_from_slice(b"abc");
        assert!(matches!(
            read_frame(&mut wire.as_slice()).await,
            Err(CoreError::EndOfStream)
        ));
    }

    #[test]
    fn oversized_payload_is_refused_on_encode() {
        let payload = vec![0_u8; MAX_FRAME_BYTES + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(CoreError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn memory_clipboard_stores_text() {
        let clipboard = MemoryClipboard::with_text("initial");
        assert_eq!(clipboard.read().await.unwrap(), "initial");
        clipboard.write("next").await.unwrap();
        assert_eq!(clipboard.read().await.unwrap(), "next");
    }

    #[test]
    fn fingerprint_is_short_and_stable() {
        assert_eq!(fingerprint("hello"), fingerprint("hello"));
        assert_ne!(fingerprint("hello"), fingerprint("hello!"));
        assert_eq!(fingerprint("hello").len(), 12);
    }
}
