use super::{
    common_header::CommonHeader,
    compound::RtcpRecord,
    packet_type::{RtcpRecordType, finish_record},
    rtcp_error::RtcpError,
};

/// Generic transport/payload feedback record (pt 205/206). The FCI is kept
/// opaque so unknown formats still round-trip byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub pt: u8,
    pub fmt: u8,
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub fci: Vec<u8>,
}

impl RtcpRecordType for Feedback {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        let start = out.len();
        let hdr = CommonHeader::new(self.fmt, self.pt, false);
        hdr.encode_into(out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
        out.extend_from_slice(&self.fci);
        finish_record(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpRecord, RtcpError> {
        if payload.len() < 8 {
            return Err(RtcpError::TooShort);
        }
        let sender_ssrc = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let media_ssrc = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        Ok(RtcpRecord::Feedback(Feedback {
            pt: hdr.pt(),
            fmt: hdr.rc_or_fmt(),
            sender_ssrc,
            media_ssrc,
            fci: payload[8..].to_vec(),
        }))
    }
}
