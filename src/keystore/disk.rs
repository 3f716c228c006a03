use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zeroize::Zeroizing;

use super::entry::ENTRY_VERSION;
use super::{KeyEntry, KeyMaterial, KeyRef, KeyStoreError, entry_file_name, unix_now};

const NONCE_LEN: usize = 12;

/// Encrypt + write entry to `path` as `nonce || AES-256-GCM(cbor(entry))`.
/// The file is replaced atomically so a crash never leaves a torn entry.
pub(crate) fn write_entry(
    seal_key: &[u8; 32],
    path: &Path,
    entry: &KeyEntry,
) -> Result<(), KeyStoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(entry, &mut buf)
        .map_err(|e| KeyStoreError::Serialization(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(seal_key)
        .map_err(|e| KeyStoreError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), buf.as_slice())
        .map_err(|e| KeyStoreError::Encryption(e.to_string()))?;
    zeroize::Zeroize::zeroize(&mut buf);

    let mut file_bytes = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    file_bytes.extend_from_slice(&nonce_bytes);
    file_bytes.extend_from_slice(&ciphertext);

    crate::persist::write_atomic(path, &file_bytes)?;
    Ok(())
}

/// Read + decrypt + deserialize the entry at `path`.
pub(crate) fn read_entry(seal_key: &[u8; 32], path: &Path) -> Result<KeyEntry, KeyStoreError> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < NONCE_LEN {
        return Err(KeyStoreError::Corrupt(format!("{} is too short", path.display())));
    }
    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(seal_key)
        .map_err(|e| KeyStoreError::Encryption(e.to_string()))?;
    let mut plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| KeyStoreError::Corrupt(format!("{} failed authentication", path.display())))?;

    let entry = ciborium::from_reader(plaintext.as_slice())
        .map_err(|e| KeyStoreError::Serialization(e.to_string()));
    zeroize::Zeroize::zeroize(&mut plaintext);
    entry
}

/// Delete every entry file in `dir`. Returns the number removed.
pub(crate) fn remove_all(dir: &Path) -> Result<usize, KeyStoreError> {
    let mut count = 0usize;
    if !dir.exists() {
        return Ok(0);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bin") {
            continue;
        }
        std::fs::remove_file(&path)?;
        count += 1;
    }
    Ok(count)
}

/// A directory of sealed entries, one file per tag, shared by every
/// backend that keeps its key material on disk.
pub(crate) struct EntryDir {
    seal_key: Zeroizing<[u8; 32]>,
    dir: PathBuf,
    generate_lock: Mutex<()>,
}

impl EntryDir {
    pub(crate) fn open(seal_key: Zeroizing<[u8; 32]>, dir: PathBuf) -> Result<Self, KeyStoreError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            seal_key,
            dir,
            generate_lock: Mutex::new(()),
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, tag: &str) -> PathBuf {
        self.dir.join(entry_file_name(tag))
    }

    /// The entry under `tag`, if any. An entry whose recorded tag differs
    /// from the one its file name was derived from is corrupt.
    pub(crate) fn read(&self, tag: &str) -> Result<Option<KeyEntry>, KeyStoreError> {
        let path = self.path(tag);
        if !path.exists() {
            return Ok(None);
        }
        let entry = read_entry(&self.seal_key, &path)?;
        if entry.tag != tag {
            return Err(KeyStoreError::Corrupt(format!(
                "{} holds tag {:?}, expected {tag:?}",
                path.display(),
                entry.tag
            )));
        }
        Ok(Some(entry))
    }

    pub(crate) fn require(&self, tag: &str) -> Result<KeyEntry, KeyStoreError> {
        self.read(tag)?
            .ok_or_else(|| KeyStoreError::NotFound(tag.to_string()))
    }

    pub(crate) fn load(&self, tag: &str) -> Result<KeyRef, KeyStoreError> {
        self.require(tag).map(|_| KeyRef::new(tag))
    }

    /// Return the entry under `tag`, or persist the `(material, public key)`
    /// produced by `generate`. Generation is serialized so two callers racing
    /// on one tag end up with the same key.
    pub(crate) fn generate_or_load<F>(
        &self,
        tag: &str,
        subject: &str,
        generate: F,
    ) -> Result<KeyRef, KeyStoreError>
    where
        F: FnOnce() -> Result<(KeyMaterial, Vec<u8>), KeyStoreError>,
    {
        let _guard = self
            .generate_lock
            .lock()
            .map_err(|_| KeyStoreError::Unavailable("mutex poisoned".into()))?;
        if self.read(tag)?.is_some() {
            return Ok(KeyRef::new(tag));
        }

        let started = std::time::Instant::now();
        let (material, public_key) = generate()?;
        let entry = KeyEntry {
            version: ENTRY_VERSION,
            tag: tag.to_string(),
            subject: subject.to_string(),
            material,
            public_key,
            created_at: unix_now(),
        };
        write_entry(&self.seal_key, &self.path(tag), &entry)?;
        tracing::info!(
            tag,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated key"
        );
        Ok(KeyRef::new(tag))
    }

    pub(crate) fn remove_all(&self) -> Result<usize, KeyStoreError> {
        remove_all(&self.dir)
    }
}
