use super::key_handle::KeyHandle;
use crate::keystore::RawPublicKey;

const REGISTER_RESERVED: u8 = 0x05;
const USER_PRESENCE: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub app_id:    String,
    pub challenge: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateRequest {
    pub app_id:     String,
    pub challenge:  Vec<u8>,
    pub key_handle: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResponse {
    pub public_key:              RawPublicKey,
    pub attestation_certificate: Vec<u8>,   // DER
    pub key_handle:              KeyHandle,
    pub signature:               Vec<u8>,   // DER ECDSA
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateResponse {
    pub public_key: RawPublicKey,
    pub signature:  Vec<u8>,   // DER ECDSA
    pub counter:    u32,
}

impl RegisterResponse {
    /// U2F raw registration response message:
    /// `0x05 || pubkey(65) || L || key handle(L) || cert || signature`.
    pub fn to_raw_message(&self) -> Vec<u8> {
        let kh = self.key_handle.as_bytes();
        let mut out = Vec::with_capacity(
            2 + self.public_key.len() + kh.len() + self.attestation_certificate.len() + self.signature.len(),
        );
        out.push(REGISTER_RESERVED);
        out.extend_from_slice(&self.public_key);
        out.push(kh.len() as u8);
        out.extend_from_slice(kh);
        out.extend_from_slice(&self.attestation_certificate);
        out.extend_from_slice(&self.signature);
        out
    }
}

impl AuthenticateResponse {
    /// U2F raw authentication response message:
    /// `user presence(1) || counter(4, BE) || signature`.
    pub fn to_raw_message(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.signature.len());
        out.push(USER_PRESENCE);
        out.extend_from_slice(&self.counter.to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }
}

/// Data signed at registration:
/// `0x00 || H(app id) || challenge || key handle || public key`.
pub(crate) fn registration_payload(
    app_id_hash: &[u8; 32],
    challenge: &[u8],
    key_handle: &KeyHandle,
    public_key: &RawPublicKey,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + 32 + challenge.len() + 80 + 65);
    data.push(0x00);
    data.extend_from_slice(app_id_hash);
    data.extend_from_slice(challenge);
    data.extend_from_slice(key_handle.as_bytes());
    data.extend_from_slice(public_key);
    data
}

/// Data signed at authentication:
/// `H(app id) || user presence || counter(4, BE) || challenge`.
pub(crate) fn authentication_payload(app_id_hash: &[u8; 32], counter: u32, challenge: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(32 + 1 + 4 + challenge.len());
    data.extend_from_slice(app_id_hash);
    data.push(USER_PRESENCE);
    data.extend_from_slice(&counter.to_be_bytes());
    data.extend_from_slice(challenge);
    data
}
