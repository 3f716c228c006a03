use chrono::{DateTime, Months, Utc};

use crate::der;
use crate::error::{Error, Result};
use crate::keystore::{KeyRef, KeyStore};

/// Tag of the persistent device attestation key used by [`AttestationMode::Device`].
pub const ATTESTATION_KEY_TAG: &str = "U2F.ATTESTATION";
pub const DEFAULT_COMMON_NAME: &str = "Keyward Key";
const VALIDITY_MONTHS: u32 = 120;

// Encoded arc bodies.
const OID_ECDSA_WITH_SHA256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
const OID_PRIME256V1: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];
const OID_BASIC_CONSTRAINTS: &[u8] = &[0x55, 0x1d, 0x13];

/// Which key the registration ceremony attests with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AttestationMode {
    /// The credential key certifies itself and signs the registration data.
    #[default]
    #[value(name = "self")]
    SelfSigned,
    /// A long-lived device key (tag [`ATTESTATION_KEY_TAG`]) is the
    /// certificate subject and signs the registration data.
    Device,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationConfig {
    pub mode: AttestationMode,
    pub common_name: String,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            mode: AttestationMode::default(),
            common_name: DEFAULT_COMMON_NAME.to_string(),
        }
    }
}

/// Issue a self-signed X.509 v3 certificate for `key`: serial 0, subject and
/// issuer `CN=common_name`, valid from `now` for ten years, basicConstraints
/// cA=false. Returns DER.
pub(crate) fn self_signed_certificate<K: KeyStore>(
    keys: &K,
    key: &KeyRef,
    common_name: &str,
    now: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let not_after = now
        .checked_add_months(Months::new(VALIDITY_MONTHS))
        .ok_or_else(|| Error::Crypto("certificate validity overflows".into()))?;
    let public_key = keys.export_public_key(key)?;

    let version = der::explicit(0, &der::unsigned_integer(&[2]));
    let serial = der::unsigned_integer(&[0]);
    let signature_algorithm = der::sequence(&[&der::oid(OID_ECDSA_WITH_SHA256)]);
    let name = distinguished_name(common_name);
    let validity = der::sequence(&[&der::time(&now), &der::time(&not_after)]);
    let spki = der::sequence(&[
        &der::sequence(&[&der::oid(OID_EC_PUBLIC_KEY), &der::oid(OID_PRIME256V1)]),
        &der::bit_string(&public_key),
    ]);
    // BasicConstraints ::= SEQUENCE { cA BOOLEAN DEFAULT FALSE, ... }; the
    // default is omitted in DER, leaving an empty sequence.
    let basic_constraints = der::sequence(&[
        &der::oid(OID_BASIC_CONSTRAINTS),
        &der::octet_string(&der::sequence(&[])),
    ]);
    let extensions = der::explicit(3, &der::sequence(&[&basic_constraints]));

    let tbs = der::sequence(&[
        &version,
        &serial,
        &signature_algorithm,
        &name,
        &validity,
        &name,
        &spki,
        &extensions,
    ]);
    let signature = keys.sign(key, &tbs)?;

    Ok(der::sequence(&[
        &tbs,
        &signature_algorithm,
        &der::bit_string(&signature),
    ]))
}

fn distinguished_name(common_name: &str) -> Vec<u8> {
    let attribute = der::sequence(&[&der::oid(OID_COMMON_NAME), &der::utf8_string(common_name)]);
    der::sequence(&[&der::set(&[&attribute])])
}
