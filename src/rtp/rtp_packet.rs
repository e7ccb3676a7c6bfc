//! Immutable RTP packet per RFC 3550.
//!
//! A packet is built (or parsed) once by the stream and then shared with
//! every subscribed session; the wire image lives in a `Bytes` so the
//! fan-out clones are reference counted, never copied.

use bytes::{BufMut, Bytes, BytesMut};

use super::rtp_error::RtpError;

pub const RTP_VERSION: u8 = 2;
const FIXED_HEADER_LEN: usize = 12;
const MAX_CSRCS: usize = 15;

/// Complete RTP packet: the wire buffer plus the parsed header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    data: Bytes,
    ssrc: u32,
    sequence_number: u16,
    timestamp: u32,
    payload_type: u8,
    marker: bool,
    csrcs: Vec<u32>,
    header_len: usize,
    padding_len: usize,
}

impl RtpPacket {
    /// Serialize a packet from its parts. The result is immutable.
    pub fn build(
        payload_type: u8,
        marker: bool,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        csrcs: &[u32],
        payload: &[u8],
    ) -> Result<Self, RtpError> {
        if csrcs.len() > MAX_CSRCS {
            return Err(RtpError::TooManyCsrcs(csrcs.len()));
        }

        let header_len = FIXED_HEADER_LEN + csrcs.len() * 4;
        let mut buf = BytesMut::with_capacity(header_len + payload.len());

        let vpxcc = (RTP_VERSION & 0b11) << 6 | (csrcs.len() as u8 & 0x0F);
        let m_pt = ((marker as u8) << 7) | (payload_type & 0x7F);
        buf.put_u8(vpxcc);
        buf.put_u8(m_pt);
        buf.put_u16(sequence_number);
        buf.put_u32(timestamp);
        buf.put_u32(ssrc);
        for csrc in csrcs {
            buf.put_u32(*csrc);
        }
        buf.put_slice(payload);

        Ok(Self {
            data: buf.freeze(),
            ssrc,
            sequence_number,
            timestamp,
            payload_type: payload_type & 0x7F,
            marker,
            csrcs: csrcs.to_vec(),
            header_len,
            padding_len: 0,
        })
    }

    /// Parse a wire buffer into a packet, keeping the buffer as-is.
    pub fn parse(data: Bytes) -> Result<Self, RtpError> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(RtpError::TooShort);
        }

        let vpxcc = data[0];
        let version = (vpxcc >> 6) & 0b11;
        if version != RTP_VERSION {
            return Err(RtpError::BadVersion(version));
        }
        let padding = ((vpxcc >> 5) & 1) != 0;
        let extension = ((vpxcc >> 4) & 1) != 0;
        let cc = (vpxcc & 0x0F) as usize;

        let m_pt = data[1];
        let marker = (m_pt >> 7) != 0;
        let payload_type = m_pt & 0x7F;

        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut header_len = FIXED_HEADER_LEN;
        if data.len() < header_len + cc * 4 {
            return Err(RtpError::CsrcCountMismatch {
                expected: cc,
                buf_left: data.len().saturating_sub(header_len),
            });
        }
        let mut csrcs = Vec::with_capacity(cc);
        for i in 0..cc {
            let off = header_len + i * 4;
            csrcs.push(u32::from_be_bytes([
                data[off],
                data[off + 1],
                data[off + 2],
                data[off + 3],
            ]));
        }
        header_len += cc * 4;

        if extension {
            if data.len() < header_len + 4 {
                return Err(RtpError::ExtensionTooShort);
            }
            let words =
                u16::from_be_bytes([data[header_len + 2], data[header_len + 3]]) as usize;
            let ext_len = 4 + words * 4;
            if data.len() < header_len + ext_len {
                return Err(RtpError::ExtensionTooShort);
            }
            header_len += ext_len;
        }

        let mut padding_len = 0usize;
        if padding {
            let pad = *data.last().ok_or(RtpError::TooShort)? as usize;
            if pad == 0 || header_len + pad > data.len() {
                return Err(RtpError::PaddingInvalid);
            }
            padding_len = pad;
        }

        Ok(Self {
            data,
            ssrc,
            sequence_number,
            timestamp,
            payload_type,
            marker,
            csrcs,
            header_len,
            padding_len,
        })
    }

    /// Full wire image, suitable for handing to the pipeline.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Media payload, excluding header and trailing padding.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.header_len..self.data.len() - self.padding_len]
    }

    /// Payload octet count for sender-report accounting.
    pub fn payload_len(&self) -> usize {
        self.data.len() - self.header_len - self.padding_len
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }
    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }
    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }
    pub fn marker(&self) -> bool {
        self.marker
    }
    pub fn csrcs(&self) -> &[u32] {
        &self.csrcs
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn build_then_parse_roundtrip() {
        let pkt = RtpPacket::build(96, true, 42, 9_000, 0xAABB_CCDD, &[], b"hello").unwrap();
        let parsed = RtpPacket::parse(pkt.data().clone()).unwrap();
        assert_eq!(parsed.payload_type(), 96);
        assert!(parsed.marker());
        assert_eq!(parsed.sequence_number(), 42);
        assert_eq!(parsed.timestamp(), 9_000);
        assert_eq!(parsed.ssrc(), 0xAABB_CCDD);
        assert_eq!(parsed.payload(), b"hello");
        assert_eq!(parsed.payload_len(), 5);
    }

    #[test]
    fn parse_too_short() {
        let err = RtpPacket::parse(Bytes::from_static(&[0u8; 11])).unwrap_err();
        assert!(matches!(err, RtpError::TooShort));
    }

    #[test]
    fn parse_bad_version() {
        let mut raw = RtpPacket::build(96, false, 1, 2, 3, &[], b"x")
            .unwrap()
            .data()
            .to_vec();
        raw[0] = (raw[0] & 0b0011_1111) | (1 << 6);
        let err = RtpPacket::parse(Bytes::from(raw)).unwrap_err();
        assert!(matches!(err, RtpError::BadVersion(1)));
    }

    #[test]
    fn parse_with_csrcs() {
        let csrcs = [0x1111_0000u32, 0x1111_0001];
        let pkt = RtpPacket::build(111, false, 7, 100, 0xCAFE_BABE, &csrcs, &[1, 2, 3]).unwrap();
        let parsed = RtpPacket::parse(pkt.data().clone()).unwrap();
        assert_eq!(parsed.csrcs(), &csrcs);
        assert_eq!(parsed.payload(), &[1, 2, 3]);
    }

    #[test]
    fn parse_truncated_csrc_list() {
        // cc = 2 but no csrc words present
        let base = RtpPacket::build(96, false, 1, 2, 3, &[], &[]).unwrap();
        let mut raw = base.data().to_vec();
        raw[0] |= 2; // claim 2 csrcs
        let err = RtpPacket::parse(Bytes::from(raw)).unwrap_err();
        assert!(matches!(err, RtpError::CsrcCountMismatch { expected: 2, .. }));
    }

    #[test]
    fn parse_skips_header_extension() {
        let base = RtpPacket::build(96, false, 1, 2, 3, &[], &[0xAA, 0xBB]).unwrap();
        let mut raw = base.data().to_vec();
        raw[0] |= 1 << 4; // X bit
        // profile 0xBEDE, one word of extension data
        let ext = [0xBE, 0xDE, 0x00, 0x01, 9, 9, 9, 9];
        raw.splice(12..12, ext.iter().copied());
        let parsed = RtpPacket::parse(Bytes::from(raw)).unwrap();
        assert_eq!(parsed.payload(), &[0xAA, 0xBB]);
    }

    #[test]
    fn parse_strips_padding_from_payload() {
        let base = RtpPacket::build(96, false, 1, 2, 3, &[], &[7, 8, 9, 0, 0, 3]).unwrap();
        let mut raw = base.data().to_vec();
        raw[0] |= 1 << 5; // P bit; last byte (3) is the pad count
        let parsed = RtpPacket::parse(Bytes::from(raw)).unwrap();
        assert_eq!(parsed.payload(), &[7, 8, 9]);
        assert_eq!(parsed.payload_len(), 3);
    }

    #[test]
    fn parse_rejects_zero_padding_count() {
        let base = RtpPacket::build(96, false, 1, 2, 3, &[], &[1, 0]).unwrap();
        let mut raw = base.data().to_vec();
        raw[0] |= 1 << 5;
        let last = raw.len() - 1;
        raw[last] = 0;
        let err = RtpPacket::parse(Bytes::from(raw)).unwrap_err();
        assert!(matches!(err, RtpError::PaddingInvalid));
    }

    #[test]
    fn csrc_limit_enforced_on_build() {
        let csrcs = vec![0u32; 16];
        let err = RtpPacket::build(96, false, 1, 2, 3, &csrcs, &[]).unwrap_err();
        assert!(matches!(err, RtpError::TooManyCsrcs(16)));
    }
}
