//! Capability interface over a secure key backing store.
//!
//! A [`KeyStore`] hands out opaque [`KeyRef`]s. Private key material never
//! crosses this boundary; callers can only sign with a reference and read
//! back the public point.

pub(crate) mod disk;
pub mod entry;
pub mod file;

pub use entry::{KeyEntry, KeyMaterial};
pub use file::FileKeyStore;

use sha2::{Digest, Sha256};

use crate::counter::CounterError;

/// Uncompressed SEC1 P-256 point: `0x04 || x || y`.
pub type RawPublicKey = [u8; 65];

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Encrypt: {0}")]
    Encryption(String),
    #[error("Corrupt: {0}")]
    Corrupt(String),
    #[error("no key under tag {0:?}")]
    NotFound(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported key: {0}")]
    Unsupported(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("counter store: {0}")]
    Counter(#[from] CounterError),
}

/// Opaque reference to a key held by a [`KeyStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRef {
    tag: String,
}

impl KeyRef {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

pub trait KeyStore: Send + Sync {
    /// Return the key under `tag`, generating and persisting a P-256 signing
    /// key labeled `subject` if none exists. Idempotent.
    fn generate_or_load(&self, tag: &str, subject: &str) -> Result<KeyRef, KeyStoreError>;

    /// Return the key under `tag`, failing with [`KeyStoreError::NotFound`].
    fn load(&self, tag: &str) -> Result<KeyRef, KeyStoreError>;

    /// ECDSA P-256 / SHA-256 over `message`, DER encoded.
    fn sign(&self, key: &KeyRef, message: &[u8]) -> Result<Vec<u8>, KeyStoreError>;

    fn export_public_key(&self, key: &KeyRef) -> Result<RawPublicKey, KeyStoreError>;
}

/// File name for the entry stored under `tag`. Tags are hashed so arbitrary
/// relying-party strings never reach the filesystem.
pub(crate) fn entry_file_name(tag: &str) -> String {
    format!("{}.bin", hex::encode(Sha256::digest(tag.as_bytes())))
}

pub(crate) fn raw_public_key(bytes: &[u8]) -> Result<RawPublicKey, KeyStoreError> {
    let point: RawPublicKey = bytes
        .try_into()
        .map_err(|_| KeyStoreError::Corrupt(format!("public key is {} bytes", bytes.len())))?;
    if point[0] != 0x04 {
        return Err(KeyStoreError::Corrupt("public key is not an uncompressed point".into()));
    }
    Ok(point)
}

pub(crate) fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
