use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::IntegrityError;

pub const MAGIC: [u8; 16] = [
    0x2c, 0xe5, 0xc8, 0xdf, 0x17, 0xe2, 0x2e, 0xf2, 0x0f, 0xd3, 0x83, 0x03, 0xfd, 0x2d, 0x99, 0x98,
];
pub const NONCE_LEN: usize = 32;
pub const KEY_HANDLE_LEN: usize = MAGIC.len() + NONCE_LEN + 32;

/// SHA-256 of the device keypair's uncompressed public point.
pub type DeviceIdentifier = [u8; 32];

/// 80-byte credential identifier:
///
/// ```text
/// M || R || H(H(D) || H(S) || H(R))
/// ```
///
/// M is [`MAGIC`], R a 32-byte random nonce, S the relying party id, D the
/// device identifier and H SHA-256. Nothing about a handle is stored; it is
/// verified by recomputing it from the embedded nonce.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyHandle([u8; KEY_HANDLE_LEN]);

impl KeyHandle {
    pub fn format(device_id: &DeviceIdentifier, nonce: &[u8; NONCE_LEN], rp_id: &str) -> Self {
        let mut inner = Sha256::new();
        inner.update(Sha256::digest(device_id));
        inner.update(Sha256::digest(rp_id.as_bytes()));
        inner.update(Sha256::digest(nonce));
        let tag = inner.finalize();

        let mut out = [0u8; KEY_HANDLE_LEN];
        out[..MAGIC.len()].copy_from_slice(&MAGIC);
        out[MAGIC.len()..MAGIC.len() + NONCE_LEN].copy_from_slice(nonce);
        out[MAGIC.len() + NONCE_LEN..].copy_from_slice(&tag);
        Self(out)
    }

    /// Recompute the handle from the nonce embedded in `candidate` and compare
    /// in constant time.
    pub fn verify(
        device_id: &DeviceIdentifier,
        candidate: &[u8],
        rp_id: &str,
    ) -> Result<Self, IntegrityError> {
        let nonce = nonce_of(candidate)?;
        let expected = Self::format(device_id, &nonce, rp_id);
        if bool::from(expected.0[..].ct_eq(candidate)) {
            Ok(expected)
        } else {
            Err(IntegrityError::KeyHandleMismatch)
        }
    }

    pub fn nonce(&self) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&self.0[MAGIC.len()..MAGIC.len() + NONCE_LEN]);
        nonce
    }

    pub fn as_bytes(&self) -> &[u8; KEY_HANDLE_LEN] {
        &self.0
    }

    /// Key store tag of the credential keypair bound to this handle.
    pub fn credential_tag(&self) -> String {
        format!("U2F.ACCOUNT.{}", self.digest_hex())
    }

    /// Counter store key for this handle.
    pub fn counter_key(&self) -> String {
        format!("{}.COUNTER", self.digest_hex())
    }

    fn digest_hex(&self) -> String {
        hex::encode(Sha256::digest(self.0))
    }
}

impl AsRef<[u8]> for KeyHandle {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyHandle({})", hex::encode(self.0))
    }
}

fn nonce_of(candidate: &[u8]) -> Result<[u8; NONCE_LEN], IntegrityError> {
    if candidate.len() != KEY_HANDLE_LEN {
        return Err(IntegrityError::InvalidKeyHandleLength(candidate.len()));
    }
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&candidate[MAGIC.len()..MAGIC.len() + NONCE_LEN]);
    Ok(nonce)
}
