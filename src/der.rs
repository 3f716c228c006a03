//! Minimal DER writer for the structures this crate emits: ECDSA signature
//! values and a self-signed X.509 certificate.

use chrono::{DateTime, Datelike, Utc};

pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_BIT_STRING: u8 = 0x03;
pub(crate) const TAG_OCTET_STRING: u8 = 0x04;
pub(crate) const TAG_OID: u8 = 0x06;
pub(crate) const TAG_UTF8_STRING: u8 = 0x0c;
pub(crate) const TAG_UTC_TIME: u8 = 0x17;
pub(crate) const TAG_GENERALIZED_TIME: u8 = 0x18;
pub(crate) const TAG_SEQUENCE: u8 = 0x30;
pub(crate) const TAG_SET: u8 = 0x31;

/// Tag-length-value with definite length, short or long form.
pub(crate) fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 6);
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let len_bytes = (len as u32).to_be_bytes();
        let skip = len_bytes.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (4 - skip) as u8);
        out.extend_from_slice(&len_bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

pub(crate) fn sequence(parts: &[&[u8]]) -> Vec<u8> {
    tlv(TAG_SEQUENCE, &parts.concat())
}

pub(crate) fn set(parts: &[&[u8]]) -> Vec<u8> {
    tlv(TAG_SET, &parts.concat())
}

/// Context-specific constructed tag `[n]`, used for EXPLICIT fields.
pub(crate) fn explicit(n: u8, content: &[u8]) -> Vec<u8> {
    tlv(0xa0 | n, content)
}

/// `content` is the encoded arc body, without tag and length.
pub(crate) fn oid(content: &[u8]) -> Vec<u8> {
    tlv(TAG_OID, content)
}

/// Non-negative INTEGER from big-endian magnitude bytes.
pub(crate) fn unsigned_integer(n: &[u8]) -> Vec<u8> {
    let n: Vec<u8> = n.iter().skip_while(|&&b| b == 0).copied().collect();
    let n = if n.is_empty() { vec![0u8] } else { n };
    let mut content = Vec::with_capacity(n.len() + 1);
    if n[0] & 0x80 != 0 {
        content.push(0);
    }
    content.extend_from_slice(&n);
    tlv(TAG_INTEGER, &content)
}

/// BIT STRING with zero unused bits.
pub(crate) fn bit_string(bytes: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(bytes.len() + 1);
    content.push(0);
    content.extend_from_slice(bytes);
    tlv(TAG_BIT_STRING, &content)
}

pub(crate) fn octet_string(bytes: &[u8]) -> Vec<u8> {
    tlv(TAG_OCTET_STRING, bytes)
}

pub(crate) fn utf8_string(s: &str) -> Vec<u8> {
    tlv(TAG_UTF8_STRING, s.as_bytes())
}

/// RFC 5280 Time: UTCTime through 2049, GeneralizedTime after.
pub(crate) fn time(t: &DateTime<Utc>) -> Vec<u8> {
    if t.year() < 2050 {
        tlv(TAG_UTC_TIME, t.format("%y%m%d%H%M%SZ").to_string().as_bytes())
    } else {
        tlv(TAG_GENERALIZED_TIME, t.format("%Y%m%d%H%M%SZ").to_string().as_bytes())
    }
}

/// DER-encode a raw 64-byte P-256 ECDSA signature (r || s).
#[cfg_attr(not(feature = "tpm"), allow(dead_code))]
pub(crate) fn encode_der_ecdsa(raw: &[u8; 64]) -> Vec<u8> {
    let r = unsigned_integer(&raw[0..32]);
    let s = unsigned_integer(&raw[32..64]);
    sequence(&[&r, &s])
}
