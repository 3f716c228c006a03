use rand::RngCore;
use std::convert::TryFrom;
use std::path::Path;
use tss_esapi::Context;
use tss_esapi::attributes::ObjectAttributesBuilder;
use tss_esapi::handles::{KeyHandle, ObjectHandle};
use tss_esapi::interface_types::algorithm::{HashingAlgorithm, PublicAlgorithm};
use tss_esapi::structures::{
    KeyedHashScheme, Private, Public, PublicBuilder, PublicKeyedHashParameters, SensitiveData,
};
use tss_esapi::traits::{Marshall, UnMarshall};
use zeroize::Zeroizing;

use super::{TpmContext, TpmError};

fn seal_err(e: impl std::fmt::Display) -> TpmError {
    TpmError::Seal(e.to_string())
}

/// A keyed-hash object holding the 32-byte entry sealing key.
/// On disk: `u32 BE private length || private || public`.
pub struct SealedBlob {
    pub private: Vec<u8>,
    pub public: Vec<u8>,
}

impl SealedBlob {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.private.len() + self.public.len());
        out.extend_from_slice(&(self.private.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.private);
        out.extend_from_slice(&self.public);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TpmError> {
        let (len, rest) = bytes
            .split_first_chunk::<4>()
            .ok_or_else(|| TpmError::Seal("sealed blob is truncated".into()))?;
        let private_len = u32::from_be_bytes(*len) as usize;
        if rest.len() < private_len {
            return Err(TpmError::Seal("sealed blob private section truncated".into()));
        }
        let (private, public) = rest.split_at(private_len);
        Ok(Self {
            private: private.to_vec(),
            public: public.to_vec(),
        })
    }
}

/// Create a sealed object wrapping a fresh random key.
pub fn create_seal(
    ctx: &mut Context,
    primary: KeyHandle,
) -> Result<(SealedBlob, Zeroizing<[u8; 32]>), TpmError> {
    let mut key = Zeroizing::new([0u8; 32]);
    rand::thread_rng().fill_bytes(&mut key[..]);

    let sensitive = SensitiveData::try_from(key.to_vec()).map_err(seal_err)?;

    let attrs = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_user_with_auth(true)
        .with_no_da(true)
        .build()
        .map_err(seal_err)?;

    let template = PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::KeyedHash)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(attrs)
        .with_keyed_hash_parameters(PublicKeyedHashParameters::new(KeyedHashScheme::Null))
        .with_keyed_hash_unique_identifier(Default::default())
        .build()
        .map_err(seal_err)?;

    let result = ctx
        .execute_with_nullauth_session(|ctx| {
            ctx.create(primary, template, None, Some(sensitive), None, None)
        })
        .map_err(|e: tss_esapi::Error| seal_err(e))?;

    let blob = SealedBlob {
        private: result.out_private.value().to_vec(),
        public: result.out_public.marshall().map_err(seal_err)?,
    };
    Ok((blob, key))
}

/// Load a sealed object and recover its key.
pub fn unseal(
    ctx: &mut Context,
    primary: KeyHandle,
    blob: &SealedBlob,
) -> Result<Zeroizing<[u8; 32]>, TpmError> {
    let private = Private::try_from(blob.private.clone()).map_err(seal_err)?;
    let public = Public::unmarshall(&blob.public).map_err(seal_err)?;

    let handle = ctx
        .execute_with_nullauth_session(|ctx| ctx.load(primary, private, public))
        .map_err(|e: tss_esapi::Error| seal_err(e))?;

    let unsealed = ctx.execute_with_nullauth_session(|ctx| ctx.unseal(ObjectHandle::from(handle)));
    ctx.flush_context(ObjectHandle::from(handle))
        .map_err(seal_err)?;
    let sensitive = unsealed.map_err(|e: tss_esapi::Error| seal_err(e))?;

    let bytes = sensitive.value();
    let mut key = Zeroizing::new([0u8; 32]);
    if bytes.len() != key.len() {
        return Err(TpmError::Seal(format!(
            "expected a 32-byte key, got {}",
            bytes.len()
        )));
    }
    key.copy_from_slice(bytes);
    Ok(key)
}

/// Unseal the key stored at `path`, or create, seal, and persist one.
pub fn load_or_create(tpm: &TpmContext, path: &Path) -> Result<Zeroizing<[u8; 32]>, TpmError> {
    if path.exists() {
        let bytes = std::fs::read(path).map_err(seal_err)?;
        let blob = SealedBlob::from_bytes(&bytes)?;
        return tpm.with_ctx(|ctx, primary| unseal(ctx, primary, &blob));
    }
    let (blob, key) = tpm.with_ctx(|ctx, primary| create_seal(ctx, primary))?;
    crate::persist::write_atomic(path, &blob.to_bytes()).map_err(seal_err)?;
    tracing::info!(path = %path.display(), "Created sealed storage key");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_layout() {
        let blob = SealedBlob {
            private: vec![1, 2, 3],
            public: vec![9, 9],
        };
        let bytes = blob.to_bytes();
        assert_eq!(bytes, [0u8, 0, 0, 3, 1, 2, 3, 9, 9]);
        let back = SealedBlob::from_bytes(&bytes).unwrap();
        assert_eq!(back.private, [1u8, 2, 3]);
        assert_eq!(back.public, [9u8, 9]);
    }

    #[test]
    fn test_truncated_blob() {
        assert!(matches!(SealedBlob::from_bytes(&[0, 0]), Err(TpmError::Seal(_))));
        assert!(matches!(
            SealedBlob::from_bytes(&[0, 0, 0, 8, 1]),
            Err(TpmError::Seal(_))
        ));
    }
}
