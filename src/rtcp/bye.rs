use super::{
    common_header::CommonHeader,
    compound::RtcpRecord,
    packet_type::{PT_BYE, RtcpRecordType, finish_record},
    rtcp_error::RtcpError,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bye {
    pub ssrcs: Vec<u32>,
    pub reason: Option<String>,
}

impl RtcpRecordType for Bye {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        let start = out.len();
        let hdr = CommonHeader::new(self.ssrcs.len() as u8, PT_BYE, false);
        hdr.encode_into(out);
        for ssrc in &self.ssrcs {
            out.extend_from_slice(&ssrc.to_be_bytes());
        }
        if let Some(reason) = &self.reason {
            let bytes = reason.as_bytes();
            if bytes.len() > 255 {
                return Err(RtcpError::ReasonTooLong(bytes.len()));
            }
            out.push(bytes.len() as u8);
            out.extend_from_slice(bytes);
        }
        finish_record(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpRecord, RtcpError> {
        let count = hdr.rc_or_fmt() as usize;
        if payload.len() < count * 4 {
            return Err(RtcpError::Truncated);
        }
        let mut ssrcs = Vec::with_capacity(count);
        for i in 0..count {
            let off = i * 4;
            ssrcs.push(u32::from_be_bytes([
                payload[off],
                payload[off + 1],
                payload[off + 2],
                payload[off + 3],
            ]));
        }
        let mut idx = count * 4;
        let reason = if idx < payload.len() {
            let len = payload[idx] as usize;
            idx += 1;
            if payload.len() < idx + len {
                return Err(RtcpError::Truncated);
            }
            Some(String::from_utf8_lossy(&payload[idx..idx + len]).into_owned())
        } else {
            None
        };

        Ok(RtcpRecord::Bye(Bye { ssrcs, reason }))
    }
}
