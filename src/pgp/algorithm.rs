//! Single-byte wire enumerations of a v4 signature packet (RFC 4880 §9).
//!
//! Every table is closed: unknown wire values are rejected with a
//! [`ConfigurationError`] rather than mapped to a default.

use sha2::Digest;

use crate::error::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureType {
    Binary,
    Text,
    Standalone,
    GenericCertification,
    PersonaCertification,
    CasualCertification,
    PositiveCertification,
    SubkeyBinding,
    PrimaryKeyBinding,
    DirectKey,
    KeyRevocation,
    SubkeyRevocation,
    CertificationRevocation,
    Timestamp,
    ThirdPartyConfirmation,
}

impl From<SignatureType> for u8 {
    fn from(t: SignatureType) -> u8 {
        match t {
            SignatureType::Binary                  => 0x00,
            SignatureType::Text                    => 0x01,
            SignatureType::Standalone              => 0x02,
            SignatureType::GenericCertification    => 0x10,
            SignatureType::PersonaCertification    => 0x11,
            SignatureType::CasualCertification     => 0x12,
            SignatureType::PositiveCertification   => 0x13,
            SignatureType::SubkeyBinding           => 0x18,
            SignatureType::PrimaryKeyBinding       => 0x19,
            SignatureType::DirectKey               => 0x1f,
            SignatureType::KeyRevocation           => 0x20,
            SignatureType::SubkeyRevocation        => 0x28,
            SignatureType::CertificationRevocation => 0x30,
            SignatureType::Timestamp               => 0x40,
            SignatureType::ThirdPartyConfirmation  => 0x50,
        }
    }
}

impl TryFrom<u8> for SignatureType {
    type Error = ConfigurationError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0x00 => Self::Binary,
            0x01 => Self::Text,
            0x02 => Self::Standalone,
            0x10 => Self::GenericCertification,
            0x11 => Self::PersonaCertification,
            0x12 => Self::CasualCertification,
            0x13 => Self::PositiveCertification,
            0x18 => Self::SubkeyBinding,
            0x19 => Self::PrimaryKeyBinding,
            0x1f => Self::DirectKey,
            0x20 => Self::KeyRevocation,
            0x28 => Self::SubkeyRevocation,
            0x30 => Self::CertificationRevocation,
            0x40 => Self::Timestamp,
            0x50 => Self::ThirdPartyConfirmation,
            other => return Err(ConfigurationError::UnsupportedSignatureType(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicKeyAlgorithm {
    RsaEncryptOrSign,
    RsaSignOnly,
    Dsa,
    Ecdsa,
    EdDsa,
}

impl From<PublicKeyAlgorithm> for u8 {
    fn from(a: PublicKeyAlgorithm) -> u8 {
        match a {
            PublicKeyAlgorithm::RsaEncryptOrSign => 1,
            PublicKeyAlgorithm::RsaSignOnly      => 3,
            PublicKeyAlgorithm::Dsa              => 17,
            PublicKeyAlgorithm::Ecdsa            => 19,
            PublicKeyAlgorithm::EdDsa            => 22,
        }
    }
}

impl TryFrom<u8> for PublicKeyAlgorithm {
    type Error = ConfigurationError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            1 => Self::RsaEncryptOrSign,
            3 => Self::RsaSignOnly,
            17 => Self::Dsa,
            19 => Self::Ecdsa,
            22 => Self::EdDsa,
            other => return Err(ConfigurationError::UnsupportedPublicKeyAlgorithm(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Sha224,
}

impl HashAlgorithm {
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Hash the concatenation of `parts`. SHA-1 is accepted on the wire but
    /// never computed here.
    pub fn digest(self, parts: &[&[u8]]) -> Result<Vec<u8>, ConfigurationError> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }
        match self {
            Self::Sha1 => Err(ConfigurationError::UnsupportedDigest(self.into())),
            Self::Sha224 => Ok(run::<sha2::Sha224>(parts)),
            Self::Sha256 => Ok(run::<sha2::Sha256>(parts)),
            Self::Sha384 => Ok(run::<sha2::Sha384>(parts)),
            Self::Sha512 => Ok(run::<sha2::Sha512>(parts)),
        }
    }
}

impl From<HashAlgorithm> for u8 {
    fn from(h: HashAlgorithm) -> u8 {
        match h {
            HashAlgorithm::Sha1   => 2,
            HashAlgorithm::Sha256 => 8,
            HashAlgorithm::Sha384 => 9,
            HashAlgorithm::Sha512 => 10,
            HashAlgorithm::Sha224 => 11,
        }
    }
}

impl TryFrom<u8> for HashAlgorithm {
    type Error = ConfigurationError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            2 => Self::Sha1,
            8 => Self::Sha256,
            9 => Self::Sha384,
            10 => Self::Sha512,
            11 => Self::Sha224,
            other => return Err(ConfigurationError::UnsupportedHashAlgorithm(other)),
        })
    }
}
