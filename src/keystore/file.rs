use std::path::{Path, PathBuf};

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use super::disk::EntryDir;
use super::{KeyMaterial, KeyRef, KeyStore, KeyStoreError, RawPublicKey, raw_public_key};

/// Software key store: one AES-256-GCM sealed file per tag.
///
/// Stands in for secure hardware on hosts without a TPM. The sealing key is
/// owned by the caller; whoever holds it can read the private scalars.
pub struct FileKeyStore {
    entries: EntryDir,
}

impl FileKeyStore {
    pub fn open(seal_key: [u8; 32], dir: PathBuf) -> Result<Self, KeyStoreError> {
        Ok(Self {
            entries: EntryDir::open(Zeroizing::new(seal_key), dir)?,
        })
    }

    pub fn dir(&self) -> &Path {
        self.entries.dir()
    }

    /// Delete every key. Returns the number of entries removed.
    pub fn wipe(&self) -> Result<usize, KeyStoreError> {
        self.entries.remove_all()
    }

    fn signing_key(&self, key: &KeyRef) -> Result<SigningKey, KeyStoreError> {
        let entry = self.entries.require(key.tag())?;
        match &entry.material {
            KeyMaterial::Software { secret } => SigningKey::from_slice(secret)
                .map_err(|_| KeyStoreError::Corrupt(format!("invalid scalar under {:?}", key.tag()))),
            KeyMaterial::Tpm { .. } => Err(KeyStoreError::Unsupported(format!(
                "{:?} is a TPM key",
                key.tag()
            ))),
        }
    }
}

impl KeyStore for FileKeyStore {
    fn generate_or_load(&self, tag: &str, subject: &str) -> Result<KeyRef, KeyStoreError> {
        self.entries.generate_or_load(tag, subject, || {
            let signing_key = SigningKey::random(&mut OsRng);
            let public_key = signing_key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec();
            let material = KeyMaterial::Software {
                secret: signing_key.to_bytes().to_vec(),
            };
            Ok((material, public_key))
        })
    }

    fn load(&self, tag: &str) -> Result<KeyRef, KeyStoreError> {
        self.entries.load(tag)
    }

    fn sign(&self, key: &KeyRef, message: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        let signing_key = self.signing_key(key)?;
        let signature: Signature = signing_key
            .try_sign(message)
            .map_err(|e| KeyStoreError::Signing(e.to_string()))?;
        Ok(signature.to_der().to_bytes().to_vec())
    }

    fn export_public_key(&self, key: &KeyRef) -> Result<RawPublicKey, KeyStoreError> {
        raw_public_key(&self.entries.require(key.tag())?.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::VerifyingKey;

    fn open_store(dir: &Path) -> FileKeyStore {
        FileKeyStore::open([0x3cu8; 32], dir.to_path_buf()).unwrap()
    }

    #[test]
    fn test_generate_or_load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let a = store.generate_or_load("tag.a", "subject").unwrap();
        let pk1 = store.export_public_key(&a).unwrap();
        let again = store.generate_or_load("tag.a", "other subject").unwrap();
        let pk2 = store.export_public_key(&again).unwrap();
        assert_eq!(pk1, pk2, "existing entry must be returned, not regenerated");
        assert_eq!(pk1[0], 0x04);
    }

    #[test]
    fn test_tags_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let a = store.generate_or_load("tag.a", "a").unwrap();
        let b = store.generate_or_load("tag.b", "b").unwrap();
        assert_ne!(
            store.export_public_key(&a).unwrap(),
            store.export_public_key(&b).unwrap()
        );
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert!(matches!(store.load("nope"), Err(KeyStoreError::NotFound(t)) if t == "nope"));
        assert!(matches!(
            store.sign(&KeyRef::new("nope"), b"msg"),
            Err(KeyStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_signature_verifies_with_exported_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let key = store.generate_or_load("signer", "signer").unwrap();

        let sig_der = store.sign(&key, b"hello keyward").unwrap();
        let point = store.export_public_key(&key).unwrap();
        let verifying_key = VerifyingKey::from_sec1_bytes(&point).unwrap();
        let sig = Signature::from_der(&sig_der).unwrap();
        assert!(verifying_key.verify(b"hello keyward", &sig).is_ok());
        assert!(verifying_key.verify(b"tampered", &sig).is_err());
    }

    #[test]
    fn test_keys_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let pk = {
            let store = open_store(dir.path());
            let key = store.generate_or_load("persisted", "p").unwrap();
            store.export_public_key(&key).unwrap()
        };
        let store = open_store(dir.path());
        let key = store.load("persisted").unwrap();
        assert_eq!(store.export_public_key(&key).unwrap(), pk);
    }

    #[test]
    fn test_wrong_seal_key_reports_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        open_store(dir.path()).generate_or_load("t", "t").unwrap();

        let other = FileKeyStore::open([0x99u8; 32], dir.path().to_path_buf()).unwrap();
        assert!(matches!(other.load("t"), Err(KeyStoreError::Corrupt(_))));
    }

    #[test]
    fn test_wipe_removes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.generate_or_load("one", "1").unwrap();
        store.generate_or_load("two", "2").unwrap();

        assert_eq!(store.wipe().unwrap(), 2);
        assert!(matches!(store.load("one"), Err(KeyStoreError::NotFound(_))));
    }
}
