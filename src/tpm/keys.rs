use super::TpmError;
use sha2::{Digest as _, Sha256};
use std::convert::TryFrom;
use std::convert::TryInto;
use tss_esapi::Context;
use tss_esapi::attributes::ObjectAttributesBuilder;
use tss_esapi::constants::tss::{TPM2_RH_NULL, TPM2_ST_HASHCHECK};
use tss_esapi::handles::{KeyHandle, ObjectHandle};
use tss_esapi::interface_types::algorithm::{HashingAlgorithm, PublicAlgorithm};
use tss_esapi::interface_types::ecc::EccCurve;
use tss_esapi::interface_types::reserved_handles::Hierarchy;
use tss_esapi::structures::{
    Digest, EccPoint, EccScheme, HashScheme, HashcheckTicket, Private, Public, PublicBuilder,
    PublicEccParametersBuilder, Signature, SignatureScheme, SymmetricDefinitionObject,
};
use tss_esapi::traits::{Marshall, UnMarshall};
use tss_esapi::tss2_esys::TPMT_TK_HASHCHECK;

use crate::keystore::RawPublicKey;

fn key_err(e: impl std::fmt::Display) -> TpmError {
    TpmError::Key(e.to_string())
}

/// Owner-hierarchy ECC storage primary. The template is fixed, so the TPM
/// rederives the same primary on every start.
pub fn create_primary(ctx: &mut Context) -> Result<KeyHandle, TpmError> {
    let ecc_params = PublicEccParametersBuilder::new_restricted_decryption_key(
        SymmetricDefinitionObject::AES_128_CFB,
        EccCurve::NistP256,
    )
    .build()
    .map_err(key_err)?;

    let attrs = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_sensitive_data_origin(true)
        .with_user_with_auth(true)
        .with_restricted(true)
        .with_decrypt(true)
        .build()
        .map_err(key_err)?;

    let template = PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::Ecc)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(attrs)
        .with_ecc_parameters(ecc_params)
        .with_ecc_unique_identifier(EccPoint::default())
        .build()
        .map_err(key_err)?;

    let result = ctx
        .execute_with_nullauth_session(|ctx| {
            ctx.create_primary(Hierarchy::Owner, template, None, None, None, None)
        })
        .map_err(|e: tss_esapi::Error| key_err(e))?;

    Ok(result.key_handle)
}

/// Create a P-256 ECDSA signing key under `primary`.
/// Returns the `(private, public)` blobs; the private blob is only usable
/// by this TPM.
pub fn create_signing_key(
    ctx: &mut Context,
    primary: KeyHandle,
) -> Result<(Vec<u8>, Vec<u8>), TpmError> {
    let scheme = EccScheme::EcDsa(HashScheme::new(HashingAlgorithm::Sha256));
    let ecc_params =
        PublicEccParametersBuilder::new_unrestricted_signing_key(scheme, EccCurve::NistP256)
            .build()
            .map_err(key_err)?;

    let attrs = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_sensitive_data_origin(true)
        .with_user_with_auth(true)
        .with_sign_encrypt(true)
        .with_no_da(true)
        .build()
        .map_err(key_err)?;

    let template = PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::Ecc)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(attrs)
        .with_ecc_parameters(ecc_params)
        .with_ecc_unique_identifier(EccPoint::default())
        .build()
        .map_err(key_err)?;

    let result = ctx
        .execute_with_nullauth_session(|ctx| ctx.create(primary, template, None, None, None, None))
        .map_err(|e: tss_esapi::Error| key_err(e))?;

    let private = result.out_private.as_bytes().to_vec();
    let public = result.out_public.marshall().map_err(key_err)?;
    Ok((private, public))
}

pub fn load_key(
    ctx: &mut Context,
    primary: KeyHandle,
    private_bytes: &[u8],
    public_bytes: &[u8],
) -> Result<KeyHandle, TpmError> {
    let private = Private::try_from(private_bytes.to_vec()).map_err(key_err)?;
    let public = Public::unmarshall(public_bytes).map_err(key_err)?;

    ctx.execute_with_nullauth_session(|ctx| ctx.load(primary, private, public))
        .map_err(|e: tss_esapi::Error| key_err(e))
}

/// ECDSA over SHA-256(`data`) with a loaded key.
/// Returns `r || s`, each zero-padded to 32 bytes.
pub fn sign(ctx: &mut Context, key: KeyHandle, data: &[u8]) -> Result<[u8; 64], TpmError> {
    let hash: [u8; 32] = Sha256::digest(data).into();
    let digest = Digest::try_from(hash.to_vec()).map_err(key_err)?;

    // Null ticket: the digest was computed outside the TPM.
    let validation: HashcheckTicket = TPMT_TK_HASHCHECK {
        tag: TPM2_ST_HASHCHECK,
        hierarchy: TPM2_RH_NULL,
        digest: Default::default(),
    }
    .try_into()
    .map_err(|e: tss_esapi::Error| key_err(e))?;

    let signature = ctx
        .execute_with_nullauth_session(|ctx| {
            ctx.sign(key, digest, SignatureScheme::Null, validation)
        })
        .map_err(|e: tss_esapi::Error| key_err(e))?;

    match signature {
        Signature::EcDsa(sig) => {
            let mut out = [0u8; 64];
            left_pad(sig.signature_r().as_bytes(), &mut out[..32]);
            left_pad(sig.signature_s().as_bytes(), &mut out[32..]);
            Ok(out)
        }
        _ => Err(TpmError::Key("expected an ECDSA signature".into())),
    }
}

/// Load, sign, and flush. The transient handle is released even when
/// signing fails.
pub fn load_and_sign(
    ctx: &mut Context,
    primary: KeyHandle,
    private_bytes: &[u8],
    public_bytes: &[u8],
    data: &[u8],
) -> Result<[u8; 64], TpmError> {
    let key = load_key(ctx, primary, private_bytes, public_bytes)?;
    let signed = sign(ctx, key, data);
    let flushed = flush(ctx, key);
    let sig = signed?;
    flushed?;
    Ok(sig)
}

pub fn flush(ctx: &mut Context, handle: KeyHandle) -> Result<(), TpmError> {
    ctx.flush_context(ObjectHandle::from(handle))
        .map_err(key_err)
}

/// Uncompressed SEC1 point from a marshalled TPM2B_PUBLIC blob.
pub fn uncompressed_point(public_bytes: &[u8]) -> Result<RawPublicKey, TpmError> {
    let public = Public::unmarshall(public_bytes).map_err(key_err)?;
    match public {
        Public::Ecc { unique, .. } => {
            let mut point = [0u8; 65];
            point[0] = 0x04;
            left_pad(unique.x().as_bytes(), &mut point[1..33]);
            left_pad(unique.y().as_bytes(), &mut point[33..]);
            Ok(point)
        }
        _ => Err(TpmError::Key("not an ECC key".into())),
    }
}

/// Copy the low-order bytes of a big-endian integer into `out`, left padded.
fn left_pad(src: &[u8], out: &mut [u8]) {
    let n = src.len().min(out.len());
    let width = out.len();
    out[width - n..].copy_from_slice(&src[src.len() - n..]);
}
