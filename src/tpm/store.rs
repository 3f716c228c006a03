use std::path::Path;

use super::{TpmContext, keys, seal};
use crate::der::encode_der_ecdsa;
use crate::keystore::disk::EntryDir;
use crate::keystore::{KeyMaterial, KeyRef, KeyStore, KeyStoreError, RawPublicKey, raw_public_key};

/// Key store whose private keys are TPM-wrapped blobs.
///
/// Entries use the same sealed on-disk format as
/// [`FileKeyStore`](crate::keystore::FileKeyStore); the AES key protecting
/// them is itself sealed to the TPM in `seal_key.blob`.
pub struct TpmKeyStore {
    tpm: TpmContext,
    entries: EntryDir,
}

impl TpmKeyStore {
    pub const SEAL_BLOB: &'static str = "seal_key.blob";

    /// Open the store rooted at `data_dir`, creating the sealed storage key
    /// on first use. Entries live under `data_dir/keys`.
    pub fn open(tpm: TpmContext, data_dir: &Path) -> Result<Self, KeyStoreError> {
        std::fs::create_dir_all(data_dir)?;
        let seal_key = seal::load_or_create(&tpm, &data_dir.join(Self::SEAL_BLOB))?;
        let entries = EntryDir::open(seal_key, data_dir.join("keys"))?;
        Ok(Self { tpm, entries })
    }

    pub fn dir(&self) -> &Path {
        self.entries.dir()
    }
}

impl KeyStore for TpmKeyStore {
    fn generate_or_load(&self, tag: &str, subject: &str) -> Result<KeyRef, KeyStoreError> {
        self.entries.generate_or_load(tag, subject, || {
            let (private, public) = self
                .tpm
                .with_ctx(|ctx, primary| keys::create_signing_key(ctx, primary))?;
            let point = keys::uncompressed_point(&public)?;
            Ok((KeyMaterial::Tpm { private, public }, point.to_vec()))
        })
    }

    fn load(&self, tag: &str) -> Result<KeyRef, KeyStoreError> {
        self.entries.load(tag)
    }

    fn sign(&self, key: &KeyRef, message: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        let entry = self.entries.require(key.tag())?;
        let KeyMaterial::Tpm { private, public } = &entry.material else {
            return Err(KeyStoreError::Unsupported(format!(
                "{:?} is not a TPM key",
                key.tag()
            )));
        };
        let started = std::time::Instant::now();
        let raw = self
            .tpm
            .with_ctx(|ctx, primary| keys::load_and_sign(ctx, primary, private, public, message))?;
        tracing::debug!(
            tag = key.tag(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "TPM sign"
        );
        Ok(encode_der_ecdsa(&raw))
    }

    fn export_public_key(&self, key: &KeyRef) -> Result<RawPublicKey, KeyStoreError> {
        raw_public_key(&self.entries.require(key.tag())?.public_key)
    }
}
