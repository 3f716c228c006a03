use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const ENTRY_VERSION: u8 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyEntry {
    pub version:    u8,
    pub tag:        String,
    pub subject:    String,
    pub material:   KeyMaterial,
    pub public_key: Vec<u8>,   // SEC1 uncompressed, 65 bytes
    pub created_at: u64,       // Unix timestamp
}

/// Backend-specific private half. Zeroed when dropped.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub enum KeyMaterial {
    /// P-256 scalar, 32 bytes.
    Software { secret: Vec<u8> },
    /// TPM2B_PRIVATE / TPM2B_PUBLIC marshaled blobs; only loadable under the
    /// primary of the TPM that created them.
    Tpm { private: Vec<u8>, public: Vec<u8> },
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Software { .. } => f.write_str("Software { .. }"),
            Self::Tpm { .. } => f.write_str("Tpm { .. }"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let material = KeyMaterial::Software { secret: vec![0x5a; 32] };
        let shown = format!("{material:?}");
        assert_eq!(shown, "Software { .. }");
    }
}
