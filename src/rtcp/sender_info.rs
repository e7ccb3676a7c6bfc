use super::rtcp_error::RtcpError;

/// Sender info in SR (20 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderInfo {
    pub ntp_msw: u32,
    pub ntp_lsw: u32,
    pub rtp_ts: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderInfo {
    pub fn new(ntp_msw: u32, ntp_lsw: u32, rtp_ts: u32, packet_count: u32, octet_count: u32) -> Self {
        Self {
            ntp_msw,
            ntp_lsw,
            rtp_ts,
            packet_count,
            octet_count,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), RtcpError> {
        if buf.len() < 20 {
            return Err(RtcpError::TooShort);
        }
        Ok((
            Self {
                ntp_msw: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
                ntp_lsw: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
                rtp_ts: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
                packet_count: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
                octet_count: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
            },
            20,
        ))
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ntp_msw.to_be_bytes());
        out.extend_from_slice(&self.ntp_lsw.to_be_bytes());
        out.extend_from_slice(&self.rtp_ts.to_be_bytes());
        out.extend_from_slice(&self.packet_count.to_be_bytes());
        out.extend_from_slice(&self.octet_count.to_be_bytes());
    }
}
