//! OpenPGP v4 signature framing.

pub mod algorithm;
pub mod signature;
pub mod subpacket;

pub use algorithm::{HashAlgorithm, PublicKeyAlgorithm, SignatureType};
pub use signature::{SignatureDigest, SignatureFrame};
pub use subpacket::{Subpacket, SubpacketList, SubpacketType};
