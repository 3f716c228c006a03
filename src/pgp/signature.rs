use std::io::Read;

use super::algorithm::{HashAlgorithm, PublicKeyAlgorithm, SignatureType};
use super::subpacket::{SubpacketList, read_exact};
use crate::error::{ConfigurationError, Result};

pub const VERSION: u8 = 4;
const TRAILER_MARKER: u8 = 0xff;

/// The body of a v4 signature packet up to, but not including, the
/// two-byte hash prefix and the signature MPIs.
///
/// The hashed area is bound into the signature by
/// [`signable_digest_input`](Self::signable_digest_input); the unhashed
/// area is not, so anything carried there (issuer hints, typically) is
/// unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureFrame {
    pub signature_type: SignatureType,
    pub public_key_algorithm: PublicKeyAlgorithm,
    pub hash_algorithm: HashAlgorithm,
    pub hashed_subpackets: SubpacketList,
    pub unhashed_subpackets: SubpacketList,
}

/// Digest over a frame plus the left 16 bits that precede the MPIs on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDigest {
    pub digest: Vec<u8>,
    pub prefix: [u8; 2],
}

impl SignatureFrame {
    pub fn new(
        signature_type: SignatureType,
        public_key_algorithm: PublicKeyAlgorithm,
        hash_algorithm: HashAlgorithm,
    ) -> Self {
        Self {
            signature_type,
            public_key_algorithm,
            hash_algorithm,
            hashed_subpackets: SubpacketList::new(),
            unhashed_subpackets: SubpacketList::new(),
        }
    }

    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; 4];
        read_exact(reader, &mut header[..1])?;
        if header[0] != VERSION {
            return Err(ConfigurationError::UnsupportedVersion(header[0]).into());
        }
        read_exact(reader, &mut header[1..])?;
        let signature_type = SignatureType::try_from(header[1])?;
        let public_key_algorithm = PublicKeyAlgorithm::try_from(header[2])?;
        let hash_algorithm = HashAlgorithm::try_from(header[3])?;
        let hashed_subpackets = SubpacketList::parse(reader)?;
        let unhashed_subpackets = SubpacketList::parse(reader)?;
        Ok(Self {
            signature_type,
            public_key_algorithm,
            hash_algorithm,
            hashed_subpackets,
            unhashed_subpackets,
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = self.hashed_region()?;
        self.unhashed_subpackets.write(&mut out)?;
        Ok(out)
    }

    /// `version || type || pk alg || hash alg || hashed area`, then the
    /// trailer `version || 0xff || u32 BE length` of everything before it.
    pub fn signable_digest_input(&self) -> Result<Vec<u8>> {
        let mut out = self.hashed_region()?;
        let len = out.len() as u32;
        out.push(VERSION);
        out.push(TRAILER_MARKER);
        out.extend_from_slice(&len.to_be_bytes());
        Ok(out)
    }

    /// Hash `data` followed by the signable input with this frame's hash
    /// algorithm.
    pub fn digest(&self, data: &[u8]) -> Result<SignatureDigest> {
        let input = self.signable_digest_input()?;
        let digest = self.hash_algorithm.digest(&[data, input.as_slice()])?;
        let prefix = [digest[0], digest[1]];
        Ok(SignatureDigest { digest, prefix })
    }

    fn hashed_region(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(6 + self.hashed_subpackets.area_len());
        out.push(VERSION);
        out.push(self.signature_type.into());
        out.push(self.public_key_algorithm.into());
        out.push(self.hash_algorithm.into());
        self.hashed_subpackets.write(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ParseError};
    use crate::pgp::subpacket::{Subpacket, SubpacketType};

    fn frame() -> SignatureFrame {
        let mut f = SignatureFrame::new(
            SignatureType::Binary,
            PublicKeyAlgorithm::Ecdsa,
            HashAlgorithm::Sha256,
        );
        f.hashed_subpackets.push(Subpacket::creation_time(1_500_000_000));
        f.hashed_subpackets.push(Subpacket::issuer_fingerprint([0xab; 20]));
        f.unhashed_subpackets.push(Subpacket::issuer([1, 2, 3, 4, 5, 6, 7, 8]));
        f
    }

    #[test]
    fn test_wire_layout() {
        let bytes = frame().serialize().unwrap();
        assert_eq!(&bytes[..4], &[4u8, 0x00, 19, 8]);
        let hashed_len = u16::from_be_bytes([bytes[4], bytes[5]]) as usize;
        assert_eq!(hashed_len, 6 + 23);
        let unhashed_at = 6 + hashed_len;
        assert_eq!(u16::from_be_bytes([bytes[unhashed_at], bytes[unhashed_at + 1]]), 10);
        assert_eq!(bytes.len(), unhashed_at + 2 + 10);
    }

    #[test]
    fn test_parse_leaves_trailing_bytes() {
        let mut bytes = frame().serialize().unwrap();
        bytes.extend_from_slice(&[0xca, 0xfe]);
        let mut reader = bytes.as_slice();
        let parsed = SignatureFrame::parse(&mut reader).unwrap();
        assert_eq!(parsed, frame());
        assert_eq!(reader, &[0xcau8, 0xfe], "hash prefix must remain unread");
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = frame().serialize().unwrap();
        bytes[0] = 3;
        assert!(matches!(
            SignatureFrame::parse(&mut bytes.as_slice()),
            Err(Error::Configuration(ConfigurationError::UnsupportedVersion(3)))
        ));
    }

    #[test]
    fn test_unknown_enum_values() {
        let mut bytes = frame().serialize().unwrap();
        bytes[2] = 99;
        assert!(matches!(
            SignatureFrame::parse(&mut bytes.as_slice()),
            Err(Error::Configuration(ConfigurationError::UnsupportedPublicKeyAlgorithm(99)))
        ));

        let mut bytes = frame().serialize().unwrap();
        bytes[3] = 1;
        assert!(matches!(
            SignatureFrame::parse(&mut bytes.as_slice()),
            Err(Error::Configuration(ConfigurationError::UnsupportedHashAlgorithm(1)))
        ));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            SignatureFrame::parse(&mut [4u8, 0x00].as_slice()),
            Err(Error::Parse(ParseError::Truncated))
        ));
        assert!(matches!(
            SignatureFrame::parse(&mut [0u8; 0].as_slice()),
            Err(Error::Parse(ParseError::Truncated))
        ));
    }

    #[test]
    fn test_signable_excludes_unhashed() {
        let a = frame();
        let mut b = frame();
        b.unhashed_subpackets = SubpacketList::new();
        b.unhashed_subpackets
            .push(Subpacket::new(SubpacketType::Other(101), vec![1, 2, 3]));
        assert_ne!(a.serialize().unwrap(), b.serialize().unwrap());
        assert_eq!(
            a.signable_digest_input().unwrap(),
            b.signable_digest_input().unwrap()
        );
    }

    #[test]
    fn test_signable_covers_hashed() {
        let a = frame();
        let mut b = frame();
        b.hashed_subpackets.push(Subpacket::key_flags(0x03));
        assert_ne!(
            a.signable_digest_input().unwrap(),
            b.signable_digest_input().unwrap()
        );
    }

    #[test]
    fn test_digest_prefix() {
        let f = frame();
        let d = f.digest(b"message").unwrap();
        assert_eq!(d.digest.len(), 32);
        assert_eq!(d.prefix, [d.digest[0], d.digest[1]]);

        let mut expected_input = b"message".to_vec();
        expected_input.extend_from_slice(&f.signable_digest_input().unwrap());
        assert_eq!(
            d.digest,
            HashAlgorithm::Sha256.digest(&[expected_input.as_slice()]).unwrap()
        );
    }

    #[test]
    fn test_sha1_digest_is_configuration_error() {
        let mut f = frame();
        f.hash_algorithm = HashAlgorithm::Sha1;
        assert!(f.serialize().is_ok(), "SHA-1 frames still encode");
        assert!(matches!(
            f.digest(b"m"),
            Err(Error::Configuration(ConfigurationError::UnsupportedDigest(2)))
        ));
    }
}
