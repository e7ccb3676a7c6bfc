//! Minimal STUN message codec per RFC 5389: binding requests/responses with
//! the attributes ICE connectivity checks actually use.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use byteorder::{BigEndian, ByteOrder};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const METHOD_BINDING: u16 = 0x0001;

const HEADER_LEN: usize = 20;

const ATTR_USERNAME: u16 = 0x0006;
const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
const ATTR_ERROR_CODE: u16 = 0x0009;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const ATTR_PRIORITY: u16 = 0x0024;
const ATTR_USE_CANDIDATE: u16 = 0x0025;
const ATTR_ICE_CONTROLLED: u16 = 0x8029;
const ATTR_ICE_CONTROLLING: u16 = 0x802A;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunError {
    TooShort,
    NotStun,
    BadAttribute(u16),
    MissingIntegrity,
}

impl fmt::Display for StunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use StunError::*;
        match self {
            TooShort => write!(f, "buffer too short for STUN"),
            NotStun => write!(f, "not a STUN message"),
            BadAttribute(t) => write!(f, "malformed attribute {t:#06x}"),
            MissingIntegrity => write!(f, "MESSAGE-INTEGRITY attribute missing"),
        }
    }
}
impl std::error::Error for StunError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl StunClass {
    fn bits(self) -> u16 {
        match self {
            Self::Request => 0b00,
            Self::Indication => 0b01,
            Self::SuccessResponse => 0b10,
            Self::ErrorResponse => 0b11,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0b00 => Self::Request,
            0b01 => Self::Indication,
            0b10 => Self::SuccessResponse,
            _ => Self::ErrorResponse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunAttribute {
    Username(String),
    MessageIntegrity([u8; 20]),
    XorMappedAddress(SocketAddr),
    ErrorCode { code: u16, reason: String },
    Priority(u32),
    UseCandidate,
    IceControlling(u64),
    IceControlled(u64),
    Unknown { attr_type: u16, value: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    pub class: StunClass,
    pub method: u16,
    pub transaction_id: [u8; 12],
    pub attributes: Vec<StunAttribute>,
}

/// Cheap demux test: STUN before any parsing (RFC 7983 first-byte range
/// plus the magic cookie).
pub fn is_stun(buf: &[u8]) -> bool {
    buf.len() >= HEADER_LEN
        && buf[0] < 4
        && BigEndian::read_u32(&buf[4..8]) == MAGIC_COOKIE
}

impl StunMessage {
    pub fn binding_request(transaction_id: [u8; 12]) -> Self {
        Self {
            class: StunClass::Request,
            method: METHOD_BINDING,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    /// Build the success response for a binding request, mirroring its
    /// transaction id and reflecting the request's source address.
    pub fn binding_success(transaction_id: [u8; 12], mapped: SocketAddr) -> Self {
        Self {
            class: StunClass::SuccessResponse,
            method: METHOD_BINDING,
            transaction_id,
            attributes: vec![StunAttribute::XorMappedAddress(mapped)],
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            StunAttribute::Username(u) => Some(u.as_str()),
            _ => None,
        })
    }

    pub fn has_use_candidate(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| matches!(a, StunAttribute::UseCandidate))
    }

    pub fn decode(buf: &[u8]) -> Result<Self, StunError> {
        if buf.len() < HEADER_LEN {
            return Err(StunError::TooShort);
        }
        let msg_type = BigEndian::read_u16(&buf[0..2]);
        if msg_type & 0xC000 != 0 || BigEndian::read_u32(&buf[4..8]) != MAGIC_COOKIE {
            return Err(StunError::NotStun);
        }
        let msg_len = BigEndian::read_u16(&buf[2..4]) as usize;
        if buf.len() < HEADER_LEN + msg_len {
            return Err(StunError::TooShort);
        }

        let class_bits = ((msg_type >> 4) & 0b01) | ((msg_type >> 7) & 0b10);
        let method = (msg_type & 0x000F) | ((msg_type >> 1) & 0x0070) | ((msg_type >> 2) & 0x0F80);
        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&buf[8..20]);

        let mut attributes = Vec::new();
        let mut idx = HEADER_LEN;
        let end = HEADER_LEN + msg_len;
        while idx + 4 <= end {
            let attr_type = BigEndian::read_u16(&buf[idx..idx + 2]);
            let attr_len = BigEndian::read_u16(&buf[idx + 2..idx + 4]) as usize;
            idx += 4;
            if idx + attr_len > end {
                return Err(StunError::BadAttribute(attr_type));
            }
            let value = &buf[idx..idx + attr_len];
            attributes.push(Self::decode_attribute(attr_type, value, &transaction_id)?);
            idx += attr_len;
            idx += (4 - attr_len % 4) % 4; // attributes are 32-bit aligned
        }

        Ok(Self {
            class: StunClass::from_bits(class_bits),
            method,
            transaction_id,
            attributes,
        })
    }

    fn decode_attribute(
        attr_type: u16,
        value: &[u8],
        transaction_id: &[u8; 12],
    ) -> Result<StunAttribute, StunError> {
        Ok(match attr_type {
            ATTR_USERNAME => {
                StunAttribute::Username(String::from_utf8_lossy(value).into_owned())
            }
            ATTR_MESSAGE_INTEGRITY => {
                if value.len() != 20 {
                    return Err(StunError::BadAttribute(attr_type));
                }
                let mut tag = [0u8; 20];
                tag.copy_from_slice(value);
                StunAttribute::MessageIntegrity(tag)
            }
            ATTR_XOR_MAPPED_ADDRESS => {
                StunAttribute::XorMappedAddress(decode_xor_address(value, transaction_id)?)
            }
            ATTR_ERROR_CODE => {
                if value.len() < 4 {
                    return Err(StunError::BadAttribute(attr_type));
                }
                let code = (value[2] as u16) * 100 + value[3] as u16;
                StunAttribute::ErrorCode {
                    code,
                    reason: String::from_utf8_lossy(&value[4..]).into_owned(),
                }
            }
            ATTR_PRIORITY => {
                if value.len() != 4 {
                    return Err(StunError::BadAttribute(attr_type));
                }
                StunAttribute::Priority(BigEndian::read_u32(value))
            }
            ATTR_USE_CANDIDATE => StunAttribute::UseCandidate,
            ATTR_ICE_CONTROLLING => {
                if value.len() != 8 {
                    return Err(StunError::BadAttribute(attr_type));
                }
                StunAttribute::IceControlling(BigEndian::read_u64(value))
            }
            ATTR_ICE_CONTROLLED => {
                if value.len() != 8 {
                    return Err(StunError::BadAttribute(attr_type));
                }
                StunAttribute::IceControlled(BigEndian::read_u64(value))
            }
            other => StunAttribute::Unknown {
                attr_type: other,
                value: value.to_vec(),
            },
        })
    }

    /// Serialize; when `integrity_key` is given a MESSAGE-INTEGRITY
    /// attribute is computed and appended per RFC 5389 §15.4.
    pub fn encode(&self, integrity_key: Option<&[u8]>) -> Vec<u8> {
        let msg_type = self.message_type();
        let mut out = Vec::with_capacity(HEADER_LEN + 64);
        let mut header = [0u8; HEADER_LEN];
        BigEndian::write_u16(&mut header[0..2], msg_type);
        BigEndian::write_u32(&mut header[4..8], MAGIC_COOKIE);
        header[8..20].copy_from_slice(&self.transaction_id);
        out.extend_from_slice(&header);

        for attr in &self.attributes {
            if matches!(attr, StunAttribute::MessageIntegrity(_)) {
                continue; // always recomputed
            }
            Self::encode_attribute(attr, &self.transaction_id, &mut out);
        }

        if let Some(key) = integrity_key {
            // Length must cover the integrity attribute while the HMAC input
            // stops just before it.
            let hashed_len = out.len() - HEADER_LEN + 24;
            BigEndian::write_u16(&mut out[2..4], hashed_len as u16);
            if let Ok(mut mac) = HmacSha1::new_from_slice(key) {
                mac.update(&out);
                let tag = mac.finalize().into_bytes();
                push_attr_header(&mut out, ATTR_MESSAGE_INTEGRITY, 20);
                out.extend_from_slice(&tag);
            }
        }

        let final_len = (out.len() - HEADER_LEN) as u16;
        BigEndian::write_u16(&mut out[2..4], final_len);
        out
    }

    fn message_type(&self) -> u16 {
        let class = self.class.bits();
        let m = self.method;
        (m & 0x000F)
            | ((m & 0x0070) << 1)
            | ((m & 0x0F80) << 2)
            | ((class & 0b01) << 4)
            | ((class & 0b10) << 7)
    }

    fn encode_attribute(attr: &StunAttribute, transaction_id: &[u8; 12], out: &mut Vec<u8>) {
        match attr {
            StunAttribute::Username(u) => {
                push_attr_header(out, ATTR_USERNAME, u.len());
                out.extend_from_slice(u.as_bytes());
            }
            StunAttribute::MessageIntegrity(tag) => {
                push_attr_header(out, ATTR_MESSAGE_INTEGRITY, 20);
                out.extend_from_slice(tag);
            }
            StunAttribute::XorMappedAddress(addr) => {
                let encoded = encode_xor_address(addr, transaction_id);
                push_attr_header(out, ATTR_XOR_MAPPED_ADDRESS, encoded.len());
                out.extend_from_slice(&encoded);
            }
            StunAttribute::ErrorCode { code, reason } => {
                push_attr_header(out, ATTR_ERROR_CODE, 4 + reason.len());
                out.extend_from_slice(&[0, 0, (code / 100) as u8, (code % 100) as u8]);
                out.extend_from_slice(reason.as_bytes());
            }
            StunAttribute::Priority(p) => {
                push_attr_header(out, ATTR_PRIORITY, 4);
                out.extend_from_slice(&p.to_be_bytes());
            }
            StunAttribute::UseCandidate => push_attr_header(out, ATTR_USE_CANDIDATE, 0),
            StunAttribute::IceControlling(tie) => {
                push_attr_header(out, ATTR_ICE_CONTROLLING, 8);
                out.extend_from_slice(&tie.to_be_bytes());
            }
            StunAttribute::IceControlled(tie) => {
                push_attr_header(out, ATTR_ICE_CONTROLLED, 8);
                out.extend_from_slice(&tie.to_be_bytes());
            }
            StunAttribute::Unknown { attr_type, value } => {
                push_attr_header(out, *attr_type, value.len());
                out.extend_from_slice(value);
            }
        }
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }
}

/// Verify the MESSAGE-INTEGRITY of a raw STUN datagram with `key`
/// (the local ice-pwd for inbound checks).
pub fn verify_integrity(buf: &[u8], key: &[u8]) -> Result<bool, StunError> {
    if buf.len() < HEADER_LEN {
        return Err(StunError::TooShort);
    }
    let msg_len = BigEndian::read_u16(&buf[2..4]) as usize;
    let end = HEADER_LEN + msg_len;
    if buf.len() < end {
        return Err(StunError::TooShort);
    }

    // locate the integrity attribute
    let mut idx = HEADER_LEN;
    while idx + 4 <= end {
        let attr_type = BigEndian::read_u16(&buf[idx..idx + 2]);
        let attr_len = BigEndian::read_u16(&buf[idx + 2..idx + 4]) as usize;
        if attr_type == ATTR_MESSAGE_INTEGRITY {
            if attr_len != 20 || idx + 4 + 20 > end {
                return Err(StunError::BadAttribute(attr_type));
            }
            let mut hashed = buf[..idx].to_vec();
            let hashed_len = idx + 24 - HEADER_LEN;
            BigEndian::write_u16(&mut hashed[2..4], hashed_len as u16);

            let Ok(mut mac) = HmacSha1::new_from_slice(key) else {
                return Ok(false);
            };
            mac.update(&hashed);
            let expected = mac.finalize().into_bytes();
            let got = &buf[idx + 4..idx + 24];
            let mut diff = 0u8;
            for (a, b) in expected.iter().zip(got.iter()) {
                diff |= a ^ b;
            }
            return Ok(diff == 0);
        }
        idx += 4 + attr_len + (4 - attr_len % 4) % 4;
    }
    Err(StunError::MissingIntegrity)
}

fn push_attr_header(out: &mut Vec<u8>, attr_type: u16, len: usize) {
    let mut hdr = [0u8; 4];
    BigEndian::write_u16(&mut hdr[0..2], attr_type);
    BigEndian::write_u16(&mut hdr[2..4], len as u16);
    out.extend_from_slice(&hdr);
}

fn encode_xor_address(addr: &SocketAddr, transaction_id: &[u8; 12]) -> Vec<u8> {
    let xport = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    match addr.ip() {
        IpAddr::V4(ip) => {
            let xip = u32::from(ip) ^ MAGIC_COOKIE;
            let mut v = vec![0, 0x01, 0, 0];
            BigEndian::write_u16(&mut v[2..4], xport);
            v.extend_from_slice(&xip.to_be_bytes());
            v
        }
        IpAddr::V6(ip) => {
            let mut v = vec![0, 0x02, 0, 0];
            BigEndian::write_u16(&mut v[2..4], xport);
            let mut mask = [0u8; 16];
            mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            mask[4..].copy_from_slice(transaction_id);
            let octets = ip.octets();
            for i in 0..16 {
                v.push(octets[i] ^ mask[i]);
            }
            v
        }
    }
}

fn decode_xor_address(value: &[u8], transaction_id: &[u8; 12]) -> Result<SocketAddr, StunError> {
    if value.len() < 8 {
        return Err(StunError::BadAttribute(ATTR_XOR_MAPPED_ADDRESS));
    }
    let family = value[1];
    let xport = BigEndian::read_u16(&value[2..4]);
    let port = xport ^ (MAGIC_COOKIE >> 16) as u16;
    match family {
        0x01 => {
            let xip = BigEndian::read_u32(&value[4..8]);
            let ip = Ipv4Addr::from(xip ^ MAGIC_COOKIE);
            Ok(SocketAddr::new(IpAddr::V4(ip), port))
        }
        0x02 => {
            if value.len() < 20 {
                return Err(StunError::BadAttribute(ATTR_XOR_MAPPED_ADDRESS));
            }
            let mut mask = [0u8; 16];
            mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            mask[4..].copy_from_slice(transaction_id);
            let mut octets = [0u8; 16];
            for i in 0..16 {
                octets[i] = value[4 + i] ^ mask[i];
            }
            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => Err(StunError::BadAttribute(ATTR_XOR_MAPPED_ADDRESS)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn txid() -> [u8; 12] {
        [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
    }

    #[test]
    fn binding_request_roundtrips() {
        let mut msg = StunMessage::binding_request(txid());
        msg.attributes
            .push(StunAttribute::Username("local:remote".into()));
        msg.attributes.push(StunAttribute::Priority(12345));

        let wire = msg.encode(None);
        assert!(is_stun(&wire));
        let back = StunMessage::decode(&wire).unwrap();
        assert_eq!(back.class, StunClass::Request);
        assert_eq!(back.method, METHOD_BINDING);
        assert_eq!(back.username(), Some("local:remote"));
    }

    #[test]
    fn integrity_verifies_with_right_key_only() {
        let mut msg = StunMessage::binding_request(txid());
        msg.attributes
            .push(StunAttribute::Username("a:b".into()));
        let wire = msg.encode(Some(b"the-ice-pwd"));

        assert!(verify_integrity(&wire, b"the-ice-pwd").unwrap());
        assert!(!verify_integrity(&wire, b"wrong-pwd").unwrap());
    }

    #[test]
    fn integrity_missing_is_an_error() {
        let wire = StunMessage::binding_request(txid()).encode(None);
        assert_eq!(
            verify_integrity(&wire, b"k").unwrap_err(),
            StunError::MissingIntegrity
        );
    }

    #[test]
    fn xor_mapped_address_roundtrips_v4() {
        let addr: SocketAddr = "192.168.1.50:40000".parse().unwrap();
        let msg = StunMessage::binding_success(txid(), addr);
        let wire = msg.encode(Some(b"pwd"));
        let back = StunMessage::decode(&wire).unwrap();
        assert_eq!(back.class, StunClass::SuccessResponse);
        let mapped = back.attributes.iter().find_map(|a| match a {
            StunAttribute::XorMappedAddress(a) => Some(*a),
            _ => None,
        });
        assert_eq!(mapped, Some(addr));
    }

    #[test]
    fn xor_mapped_address_roundtrips_v6() {
        let addr: SocketAddr = "[2001:db8::1]:9".parse().unwrap();
        let msg = StunMessage::binding_success(txid(), addr);
        let wire = msg.encode(None);
        let back = StunMessage::decode(&wire).unwrap();
        let mapped = back.attributes.iter().find_map(|a| match a {
            StunAttribute::XorMappedAddress(a) => Some(*a),
            _ => None,
        });
        assert_eq!(mapped, Some(addr));
    }

    #[test]
    fn non_stun_rejected() {
        assert!(!is_stun(&[0x80, 0x00, 0x00, 0x00]));
        assert!(StunMessage::decode(&[0u8; 8]).is_err());
        // right length, wrong cookie
        let mut buf = [0u8; 20];
        buf[4] = 0xFF;
        assert!(matches!(
            StunMessage::decode(&buf),
            Err(StunError::NotStun)
        ));
    }

    #[test]
    fn use_candidate_flag_detected() {
        let mut msg = StunMessage::binding_request(txid());
        msg.attributes.push(StunAttribute::UseCandidate);
        let back = StunMessage::decode(&msg.encode(None)).unwrap();
        assert!(back.has_use_candidate());
    }
}
