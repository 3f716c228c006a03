//! TPM 2.0 backing for [`KeyStore`](crate::keystore::KeyStore).

pub mod context;
pub mod keys;
pub mod seal;
pub mod store;

pub use context::TpmContext;
pub use store::TpmKeyStore;

use crate::keystore::KeyStoreError;

#[derive(Debug, thiserror::Error)]
pub enum TpmError {
    #[error("TPM context error: {0}")]
    Context(String),
    #[error("TPM key error: {0}")]
    Key(String),
    #[error("TPM seal error: {0}")]
    Seal(String),
    #[error("TPM error: {0}")]
    Other(String),
}

impl From<tss_esapi::Error> for TpmError {
    fn from(e: tss_esapi::Error) -> Self {
        TpmError::Other(e.to_string())
    }
}

impl From<TpmError> for KeyStoreError {
    fn from(e: TpmError) -> Self {
        match e {
            TpmError::Context(msg) => KeyStoreError::Unavailable(msg),
            TpmError::Key(msg) => KeyStoreError::Signing(msg),
            other => KeyStoreError::Encryption(other.to_string()),
        }
    }
}
