use crate::counter::CounterError;
use crate::keystore::KeyStoreError;

/// Unsupported protocol versions and algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unsupported signature version {0}")]
    UnsupportedVersion(u8),
    #[error("unsupported signature type {0:#04x}")]
    UnsupportedSignatureType(u8),
    #[error("unsupported public key algorithm {0}")]
    UnsupportedPublicKeyAlgorithm(u8),
    #[error("unsupported hash algorithm {0}")]
    UnsupportedHashAlgorithm(u8),
    #[error("no digest implementation for hash algorithm {0}")]
    UnsupportedDigest(u8),
}

/// Key handle rejected for this device / relying party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("key handle was not issued for this relying party")]
    KeyHandleMismatch,
    #[error("key handle has length {0}, expected 80")]
    InvalidKeyHandleLength(usize),
}

/// Kind tag for every malformed-input failure of the OpenPGP codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("invalid subpacket length")]
    InvalidSubpacketLength,
    #[error("subpacket type {0} has a malformed body")]
    InvalidSubpacketBody(u8),
    #[error("duplicate subpacket type {0}")]
    DuplicateSubpacket(u8),
    #[error("unsupported critical subpacket type {0}")]
    UnsupportedCriticalSubpacket(u8),
    #[error("read failed: {0}")]
    Io(std::io::ErrorKind),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("integrity: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("key store: {0}")]
    KeyStore(KeyStoreError),
    #[error("crypto: {0}")]
    Crypto(String),
    #[error("parse: {0}")]
    Parse(#[from] ParseError),
}

impl From<KeyStoreError> for Error {
    fn from(e: KeyStoreError) -> Self {
        match e {
            KeyStoreError::Signing(msg) => Error::Crypto(msg),
            other => Error::KeyStore(other),
        }
    }
}

impl From<CounterError> for Error {
    fn from(e: CounterError) -> Self {
        Error::KeyStore(KeyStoreError::Counter(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
