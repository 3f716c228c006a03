use std::collections::HashSet;
use std::io::Read;

use crate::error::{Error, ParseError, Result};

const CRITICAL_BIT: u8 = 0x80;
/// Area length prefix is a u16.
pub const MAX_AREA_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubpacketType {
    SignatureCreationTime,
    SignatureExpirationTime,
    ExportableCertification,
    Revocable,
    KeyExpirationTime,
    PreferredSymmetricAlgorithms,
    Issuer,
    NotationData,
    PreferredHashAlgorithms,
    PreferredCompressionAlgorithms,
    KeyServerPreferences,
    PrimaryUserId,
    KeyFlags,
    SignersUserId,
    ReasonForRevocation,
    Features,
    IssuerFingerprint,
    /// Not interpreted. Kept verbatim when non-critical.
    Other(u8),
}

impl SubpacketType {
    pub fn from_u8(v: u8) -> Self {
        match v & !CRITICAL_BIT {
            2 => Self::SignatureCreationTime,
            3 => Self::SignatureExpirationTime,
            4 => Self::ExportableCertification,
            7 => Self::Revocable,
            9 => Self::KeyExpirationTime,
            11 => Self::PreferredSymmetricAlgorithms,
            16 => Self::Issuer,
            20 => Self::NotationData,
            21 => Self::PreferredHashAlgorithms,
            22 => Self::PreferredCompressionAlgorithms,
            23 => Self::KeyServerPreferences,
            25 => Self::PrimaryUserId,
            27 => Self::KeyFlags,
            28 => Self::SignersUserId,
            29 => Self::ReasonForRevocation,
            30 => Self::Features,
            33 => Self::IssuerFingerprint,
            other => Self::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::SignatureCreationTime => 2,
            Self::SignatureExpirationTime => 3,
            Self::ExportableCertification => 4,
            Self::Revocable => 7,
            Self::KeyExpirationTime => 9,
            Self::PreferredSymmetricAlgorithms => 11,
            Self::Issuer => 16,
            Self::NotationData => 20,
            Self::PreferredHashAlgorithms => 21,
            Self::PreferredCompressionAlgorithms => 22,
            Self::KeyServerPreferences => 23,
            Self::PrimaryUserId => 25,
            Self::KeyFlags => 27,
            Self::SignersUserId => 28,
            Self::ReasonForRevocation => 29,
            Self::Features => 30,
            Self::IssuerFingerprint => 33,
            Self::Other(v) => v & !CRITICAL_BIT,
        }
    }

    /// False for an `Other` carrying a known id or the critical bit, which
    /// would not survive a parse.
    fn is_canonical(self) -> bool {
        match self {
            Self::Other(v) => Self::from_u8(v) == self,
            _ => true,
        }
    }

    /// Notations may appear many times; uninterpreted types are not checked.
    pub fn is_repeatable(self) -> bool {
        matches!(self, Self::NotationData | Self::Other(_))
    }

    fn fixed_body_len(self) -> Option<usize> {
        match self {
            Self::SignatureCreationTime
            | Self::SignatureExpirationTime
            | Self::KeyExpirationTime => Some(4),
            Self::Issuer => Some(8),
            Self::ExportableCertification | Self::Revocable | Self::PrimaryUserId => Some(1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpacket {
    pub critical: bool,
    pub kind: SubpacketType,
    pub body: Vec<u8>,
}

impl Subpacket {
    /// `Other` values that name a known type are mapped to that type.
    pub fn new(kind: SubpacketType, body: Vec<u8>) -> Self {
        let kind = SubpacketType::from_u8(kind.to_u8());
        Self { critical: false, kind, body }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn creation_time(unix_secs: u32) -> Self {
        Self::new(SubpacketType::SignatureCreationTime, unix_secs.to_be_bytes().to_vec())
    }

    pub fn issuer(key_id: [u8; 8]) -> Self {
        Self::new(SubpacketType::Issuer, key_id.to_vec())
    }

    /// v4 fingerprint: version octet 4 followed by the 20-byte SHA-1 fingerprint.
    pub fn issuer_fingerprint(fingerprint: [u8; 20]) -> Self {
        let mut body = Vec::with_capacity(21);
        body.push(4);
        body.extend_from_slice(&fingerprint);
        Self::new(SubpacketType::IssuerFingerprint, body)
    }

    pub fn key_flags(flags: u8) -> Self {
        Self::new(SubpacketType::KeyFlags, vec![flags])
    }

    fn type_octet(&self) -> u8 {
        let t = self.kind.to_u8();
        if self.critical { t | CRITICAL_BIT } else { t }
    }

    fn encoded_len(&self) -> usize {
        let len = self.body.len() + 1;
        length_header_len(len) + len
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_length(out, self.body.len() + 1);
        out.push(self.type_octet());
        out.extend_from_slice(&self.body);
    }
}

/// An ordered subpacket area, prefixed on the wire by its u16 byte length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubpacketList {
    packets: Vec<Subpacket>,
}

impl SubpacketList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: Subpacket) {
        self.packets.push(packet);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Subpacket> {
        self.packets.iter()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn find(&self, kind: SubpacketType) -> Option<&Subpacket> {
        self.packets.iter().find(|p| p.kind == kind)
    }

    pub fn creation_time(&self) -> Option<u32> {
        let body = &self.find(SubpacketType::SignatureCreationTime)?.body;
        Some(u32::from_be_bytes(body.as_slice().try_into().ok()?))
    }

    pub fn issuer(&self) -> Option<[u8; 8]> {
        self.find(SubpacketType::Issuer)?.body.as_slice().try_into().ok()
    }

    /// Byte length of the area, excluding its own length prefix.
    pub fn area_len(&self) -> usize {
        self.packets.iter().map(Subpacket::encoded_len).sum()
    }

    /// Append the length-prefixed area to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let area_len = self.area_len();
        let prefix = u16::try_from(area_len).map_err(|_| {
            Error::Crypto(format!("subpacket area of {area_len} bytes exceeds {MAX_AREA_LEN}"))
        })?;
        if let Some(p) = self.packets.iter().find(|p| !p.kind.is_canonical()) {
            return Err(Error::Crypto(format!("{:?} does not encode to its own type octet", p.kind)));
        }
        out.extend_from_slice(&prefix.to_be_bytes());
        for packet in &self.packets {
            packet.write(out);
        }
        Ok(())
    }

    /// Read one length-prefixed area from `reader`.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut len_bytes = [0u8; 2];
        read_exact(reader, &mut len_bytes)?;
        let mut area = vec![0u8; u16::from_be_bytes(len_bytes) as usize];
        read_exact(reader, &mut area)?;
        Ok(Self::parse_area(&area)?)
    }

    fn parse_area(mut area: &[u8]) -> Result<Self, ParseError> {
        let mut packets = Vec::new();
        let mut seen = HashSet::new();
        while !area.is_empty() {
            let (len, header) = read_length(area)?;
            area = &area[header..];
            if len == 0 || len > area.len() {
                return Err(ParseError::InvalidSubpacketLength);
            }
            let (packet_bytes, rest) = area.split_at(len);
            area = rest;

            let type_octet = packet_bytes[0];
            let critical = type_octet & CRITICAL_BIT != 0;
            let kind = SubpacketType::from_u8(type_octet);
            let body = &packet_bytes[1..];

            if let SubpacketType::Other(raw) = kind {
                if critical {
                    return Err(ParseError::UnsupportedCriticalSubpacket(raw));
                }
            }
            if kind.fixed_body_len().is_some_and(|n| n != body.len()) {
                return Err(ParseError::InvalidSubpacketBody(kind.to_u8()));
            }
            if !kind.is_repeatable() && !seen.insert(kind) {
                return Err(ParseError::DuplicateSubpacket(kind.to_u8()));
            }
            packets.push(Subpacket { critical, kind, body: body.to_vec() });
        }
        Ok(Self { packets })
    }
}

impl FromIterator<Subpacket> for SubpacketList {
    fn from_iter<I: IntoIterator<Item = Subpacket>>(iter: I) -> Self {
        Self { packets: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a SubpacketList {
    type Item = &'a Subpacket;
    type IntoIter = std::slice::Iter<'a, Subpacket>;

    fn into_iter(self) -> Self::IntoIter {
        self.packets.iter()
    }
}

pub(crate) fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ParseError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => ParseError::Truncated,
        kind => ParseError::Io(kind),
    })
}

// RFC 4880 §5.2.3.1 subpacket lengths: one octet below 192, two octets
// up to 8383, otherwise 0xff followed by a u32.

fn length_header_len(len: usize) -> usize {
    match len {
        0..=191 => 1,
        192..=8383 => 2,
        _ => 5,
    }
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    match len {
        0..=191 => out.push(len as u8),
        192..=8383 => {
            let v = len - 192;
            out.push(((v >> 8) as u8) + 192);
            out.push((v & 0xff) as u8);
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
}

/// Returns `(length, header bytes consumed)`.
fn read_length(buf: &[u8]) -> Result<(usize, usize), ParseError> {
    let first = *buf.first().ok_or(ParseError::InvalidSubpacketLength)?;
    match first {
        0..=191 => Ok((first as usize, 1)),
        192..=254 => {
            let second = *buf.get(1).ok_or(ParseError::InvalidSubpacketLength)?;
            Ok(((((first as usize) - 192) << 8) + second as usize + 192, 2))
        }
        255 => {
            let bytes: [u8; 4] = buf
                .get(1..5)
                .and_then(|b| b.try_into().ok())
                .ok_or(ParseError::InvalidSubpacketLength)?;
            Ok((u32::from_be_bytes(bytes) as usize, 5))
        }
    }
}
