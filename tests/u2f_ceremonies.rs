use std::path::Path;
use std::sync::Arc;

use keyward::counter::FileCounterStore;
use keyward::error::{Error, IntegrityError};
use keyward::keystore::{FileKeyStore, KeyStore, KeyStoreError};
use keyward::u2f::attestation::ATTESTATION_KEY_TAG;
use keyward::u2f::{
    AttestationConfig, AttestationMode, AuthenticateRequest, Authenticator, KeyHandle,
    RegisterRequest,
};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};

const SEAL_KEY: [u8; 32] = [0x11; 32];

type FileAuthenticator = Authenticator<FileKeyStore, FileCounterStore>;

fn open(dir: &Path, mode: AttestationMode) -> FileAuthenticator {
    let keys = FileKeyStore::open(SEAL_KEY, dir.join("keys")).unwrap();
    let counters = FileCounterStore::open(dir.join("counters.cbor")).unwrap();
    Authenticator::new(
        keys,
        counters,
        AttestationConfig {
            mode,
            ..AttestationConfig::default()
        },
    )
}

fn register(auth: &FileAuthenticator, app_id: &str) -> KeyHandle {
    auth.register(&RegisterRequest {
        app_id: app_id.into(),
        challenge: vec![0xc1; 32],
    })
    .unwrap()
    .key_handle
}

fn authenticate_req(app_id: &str, kh: &[u8]) -> AuthenticateRequest {
    AuthenticateRequest {
        app_id: app_id.into(),
        challenge: vec![0xa7; 32],
        key_handle: kh.to_vec(),
    }
}

fn verify(public_key: &[u8], message: &[u8], der: &[u8]) -> bool {
    let vk = VerifyingKey::from_sec1_bytes(public_key).unwrap();
    let sig = Signature::from_der(der).unwrap();
    vk.verify(message, &sig).is_ok()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn registration_data(app_id: &str, challenge: &[u8], kh: &KeyHandle, pk: &[u8]) -> Vec<u8> {
    let mut data = vec![0x00];
    data.extend_from_slice(&Sha256::digest(app_id.as_bytes()));
    data.extend_from_slice(challenge);
    data.extend_from_slice(kh.as_bytes());
    data.extend_from_slice(pk);
    data
}

#[test]
fn test_register_self_attestation() {
    let dir = tempfile::tempdir().unwrap();
    let auth = open(dir.path(), AttestationMode::SelfSigned);
    let challenge = [0x42u8; 32];
    let resp = auth
        .register(&RegisterRequest {
            app_id: "https://example.com".into(),
            challenge: challenge.to_vec(),
        })
        .unwrap();

    assert_eq!(resp.public_key[0], 0x04);
    assert_eq!(resp.key_handle.as_bytes().len(), 80);
    assert!(
        contains(&resp.attestation_certificate, &resp.public_key),
        "certificate must carry the credential key"
    );

    let data = registration_data("https://example.com", &challenge, &resp.key_handle, &resp.public_key);
    assert!(verify(&resp.public_key, &data, &resp.signature));

    let raw = resp.to_raw_message();
    assert_eq!(raw[0], 0x05);
    assert_eq!(&raw[1..66], &resp.public_key[..]);
    assert_eq!(raw[66], 80);
    assert!(raw.ends_with(&resp.signature));
}

#[test]
fn test_register_device_attestation() {
    let dir = tempfile::tempdir().unwrap();
    let auth = open(dir.path(), AttestationMode::Device);
    let challenge = [0x43u8; 32];
    let first = auth
        .register(&RegisterRequest {
            app_id: "https://example.com".into(),
            challenge: challenge.to_vec(),
        })
        .unwrap();
    let second = auth
        .register(&RegisterRequest {
            app_id: "https://example.org".into(),
            challenge: challenge.to_vec(),
        })
        .unwrap();

    let attestation = auth.key_store().load(ATTESTATION_KEY_TAG).unwrap();
    let attestation_pk = auth.key_store().export_public_key(&attestation).unwrap();
    assert!(contains(&first.attestation_certificate, &attestation_pk));
    assert!(!contains(&first.attestation_certificate, &first.public_key));
    assert!(contains(&second.attestation_certificate, &attestation_pk));

    let data = registration_data("https://example.com", &challenge, &first.key_handle, &first.public_key);
    assert!(verify(&attestation_pk, &data, &first.signature));
    assert!(!verify(&first.public_key, &data, &first.signature));
}

#[test]
fn test_each_registration_gets_a_fresh_credential() {
    let dir = tempfile::tempdir().unwrap();
    let auth = open(dir.path(), AttestationMode::SelfSigned);
    let req = RegisterRequest {
        app_id: "https://example.com".into(),
        challenge: vec![0; 32],
    };
    let a = auth.register(&req).unwrap();
    let b = auth.register(&req).unwrap();
    assert_ne!(a.key_handle, b.key_handle);
    assert_ne!(a.public_key, b.public_key);
}

#[test]
fn test_authenticate_counter_increments() {
    let dir = tempfile::tempdir().unwrap();
    let auth = open(dir.path(), AttestationMode::SelfSigned);
    let kh = register(&auth, "https://example.com");
    let req = authenticate_req("https://example.com", kh.as_bytes());

    let counters: Vec<u32> = (0..3)
        .map(|_| auth.authenticate(&req).unwrap().counter)
        .collect();
    assert_eq!(counters, [1, 2, 3]);
}

#[test]
fn test_authenticate_signature_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let auth = open(dir.path(), AttestationMode::SelfSigned);
    let reg = auth
        .register(&RegisterRequest {
            app_id: "https://example.com".into(),
            challenge: vec![0; 32],
        })
        .unwrap();
    let req = authenticate_req("https://example.com", reg.key_handle.as_bytes());
    let resp = auth.authenticate(&req).unwrap();
    assert_eq!(resp.public_key, reg.public_key);

    let mut data = Sha256::digest(b"https://example.com").to_vec();
    data.push(0x01);
    data.extend_from_slice(&resp.counter.to_be_bytes());
    data.extend_from_slice(&req.challenge);
    assert!(verify(&resp.public_key, &data, &resp.signature));

    let raw = resp.to_raw_message();
    assert_eq!(&raw[..5], &[0x01u8, 0, 0, 0, 1]);
    assert_eq!(&raw[5..], &resp.signature[..]);
}

#[test]
fn test_counters_are_per_credential() {
    let dir = tempfile::tempdir().unwrap();
    let auth = open(dir.path(), AttestationMode::SelfSigned);
    let a = register(&auth, "https://a.example");
    let b = register(&auth, "https://b.example");

    auth.authenticate(&authenticate_req("https://a.example", a.as_bytes()))
        .unwrap();
    auth.authenticate(&authenticate_req("https://a.example", a.as_bytes()))
        .unwrap();
    let first_b = auth
        .authenticate(&authenticate_req("https://b.example", b.as_bytes()))
        .unwrap();
    assert_eq!(first_b.counter, 1);
}

#[test]
fn test_concurrent_authentications_never_repeat_a_counter() {
    let dir = tempfile::tempdir().unwrap();
    let auth = Arc::new(open(dir.path(), AttestationMode::SelfSigned));
    let kh = register(&auth, "https://example.com");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let auth = auth.clone();
            let req = authenticate_req("https://example.com", kh.as_bytes());
            std::thread::spawn(move || {
                (0..5)
                    .map(|_| auth.authenticate(&req).unwrap().counter)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen: Vec<u32> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (1..=40).collect::<Vec<u32>>());
}

#[test]
fn test_cross_origin_handle_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let auth = open(dir.path(), AttestationMode::SelfSigned);
    let kh = register(&auth, "https://example.com");

    let err = auth
        .authenticate(&authenticate_req("https://evil.example", kh.as_bytes()))
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(IntegrityError::KeyHandleMismatch)));
}

#[test]
fn test_tampered_and_short_handles_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let auth = open(dir.path(), AttestationMode::SelfSigned);
    let kh = register(&auth, "https://example.com");

    let mut tampered = kh.as_bytes().to_vec();
    tampered[20] ^= 0x01;
    assert!(matches!(
        auth.authenticate(&authenticate_req("https://example.com", &tampered)),
        Err(Error::Integrity(IntegrityError::KeyHandleMismatch))
    ));
    assert!(matches!(
        auth.authenticate(&authenticate_req("https://example.com", &kh.as_bytes()[..79])),
        Err(Error::Integrity(_))
    ));
}

#[test]
fn test_valid_but_unregistered_handle_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let auth = open(dir.path(), AttestationMode::SelfSigned);
    let device_id = auth.device_identifier().unwrap();
    let kh = KeyHandle::format(&device_id, &[9u8; 32], "https://example.com");

    let err = auth
        .authenticate(&authenticate_req("https://example.com", kh.as_bytes()))
        .unwrap_err();
    assert!(matches!(err, Error::KeyStore(KeyStoreError::NotFound(_))));
}

#[test]
fn test_handle_from_other_device_rejected() {
    let a_dir = tempfile::tempdir().unwrap();
    let b_dir = tempfile::tempdir().unwrap();
    let a = open(a_dir.path(), AttestationMode::SelfSigned);
    let b = open(b_dir.path(), AttestationMode::SelfSigned);
    let kh = register(&a, "https://example.com");

    assert!(matches!(
        b.authenticate(&authenticate_req("https://example.com", kh.as_bytes())),
        Err(Error::Integrity(IntegrityError::KeyHandleMismatch))
    ));
}

#[test]
fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (kh, device_id) = {
        let auth = open(dir.path(), AttestationMode::SelfSigned);
        let kh = register(&auth, "https://example.com");
        let req = authenticate_req("https://example.com", kh.as_bytes());
        assert_eq!(auth.authenticate(&req).unwrap().counter, 1);
        assert_eq!(auth.authenticate(&req).unwrap().counter, 2);
        (kh, auth.device_identifier().unwrap())
    };

    let auth = open(dir.path(), AttestationMode::SelfSigned);
    assert_eq!(auth.device_identifier().unwrap(), device_id);
    let req = authenticate_req("https://example.com", kh.as_bytes());
    assert_eq!(auth.authenticate(&req).unwrap().counter, 3);
}
