use std::sync::Mutex;

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use super::attestation::{
    ATTESTATION_KEY_TAG, AttestationConfig, AttestationMode, self_signed_certificate,
};
use super::key_handle::{DeviceIdentifier, KeyHandle, NONCE_LEN};
use super::message::{
    AuthenticateRequest, AuthenticateResponse, RegisterRequest, RegisterResponse,
    authentication_payload, registration_payload,
};
use crate::counter::CounterStore;
use crate::error::{Error, Result};
use crate::keystore::{KeyStore, KeyStoreError};

pub const DEVICE_IDENTIFIER_TAG: &str = "U2F.DEVICE_IDENTIFIER";

/// U2F authenticator over a key store and a counter store.
///
/// Ceremonies may run concurrently. The only shared mutable state is the
/// counter store, whose read-increment-persist runs under one mutex that is
/// never held across key generation or signing.
pub struct Authenticator<K, C> {
    keys: K,
    counters: Mutex<C>,
    device_id: Mutex<Option<DeviceIdentifier>>,
    attestation: AttestationConfig,
}

impl<K: KeyStore, C: CounterStore> Authenticator<K, C> {
    pub fn new(keys: K, counters: C, attestation: AttestationConfig) -> Self {
        Self {
            keys,
            counters: Mutex::new(counters),
            device_id: Mutex::new(None),
            attestation,
        }
    }

    pub fn key_store(&self) -> &K {
        &self.keys
    }

    pub fn attestation(&self) -> &AttestationConfig {
        &self.attestation
    }

    /// SHA-256 of the device keypair's public point, generating the keypair
    /// on first use.
    pub fn device_identifier(&self) -> Result<DeviceIdentifier> {
        let mut cached = self
            .device_id
            .lock()
            .map_err(|_| KeyStoreError::Unavailable("mutex poisoned".into()))?;
        if let Some(id) = *cached {
            return Ok(id);
        }
        let key = self
            .keys
            .generate_or_load(DEVICE_IDENTIFIER_TAG, DEVICE_IDENTIFIER_TAG)?;
        let public_key = self.keys.export_public_key(&key)?;
        let id: DeviceIdentifier = Sha256::digest(public_key).into();
        *cached = Some(id);
        Ok(id)
    }

    pub fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse> {
        let device_id = self.device_identifier()?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| Error::Crypto(format!("random source: {e}")))?;
        let key_handle = KeyHandle::format(&device_id, &nonce, &req.app_id);

        let credential = self
            .keys
            .generate_or_load(&key_handle.credential_tag(), &req.app_id)?;
        let public_key = self.keys.export_public_key(&credential)?;

        let attestation_key = match self.attestation.mode {
            AttestationMode::SelfSigned => credential,
            AttestationMode::Device => self
                .keys
                .generate_or_load(ATTESTATION_KEY_TAG, &self.attestation.common_name)?,
        };
        let attestation_certificate = self_signed_certificate(
            &self.keys,
            &attestation_key,
            &self.attestation.common_name,
            chrono::Utc::now(),
        )?;

        let app_id_hash: [u8; 32] = Sha256::digest(req.app_id.as_bytes()).into();
        let payload = registration_payload(&app_id_hash, &req.challenge, &key_handle, &public_key);
        let signature = self.keys.sign(&attestation_key, &payload)?;

        tracing::info!(
            app_id = %req.app_id,
            mode = ?self.attestation.mode,
            "Registered credential"
        );
        Ok(RegisterResponse {
            public_key,
            attestation_certificate,
            key_handle,
            signature,
        })
    }

    pub fn authenticate(&self, req: &AuthenticateRequest) -> Result<AuthenticateResponse> {
        let device_id = self.device_identifier()?;
        let key_handle = match KeyHandle::verify(&device_id, &req.key_handle, &req.app_id) {
            Ok(kh) => kh,
            Err(e) => {
                tracing::warn!(app_id = %req.app_id, "Rejected key handle: {e}");
                return Err(e.into());
            }
        };

        let credential = self.keys.load(&key_handle.credential_tag())?;
        let public_key = self.keys.export_public_key(&credential)?;

        let counter = self.next_counter(&key_handle)?;
        tracing::info!(app_id = %req.app_id, counter, "Counter advanced");

        let app_id_hash: [u8; 32] = Sha256::digest(req.app_id.as_bytes()).into();
        let payload = authentication_payload(&app_id_hash, counter, &req.challenge);
        let signature = self.keys.sign(&credential, &payload)?;

        Ok(AuthenticateResponse {
            public_key,
            signature,
            counter,
        })
    }

    /// Read the current counter for `key_handle` and persist its successor.
    /// A value handed out here is never handed out again, even if the caller
    /// later fails to sign with it.
    fn next_counter(&self, key_handle: &KeyHandle) -> Result<u32> {
        let key = key_handle.counter_key();
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| KeyStoreError::Unavailable("mutex poisoned".into()))?;
        let current = counters.get(&key)?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| Error::Crypto("signature counter exhausted".into()))?;
        counters.put(&key, next)?;
        Ok(current)
    }
}
