use super::{
    common_header::CommonHeader,
    compound::RtcpRecord,
    packet_type::{PT_SDES, RtcpRecordType, finish_record},
    rtcp_error::RtcpError,
};

pub const SDES_CNAME: u8 = 1;

/// One SDES chunk: an SSRC plus its items.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdesChunk {
    pub ssrc: u32,
    pub items: Vec<(u8, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sdes {
    pub chunks: Vec<SdesChunk>,
}

impl RtcpRecordType for Sdes {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        let start = out.len();
        let hdr = CommonHeader::new(self.chunks.len() as u8, PT_SDES, false);
        hdr.encode_into(out);
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.ssrc.to_be_bytes());
            for (item_type, text) in &chunk.items {
                let bytes = text.as_bytes();
                if bytes.len() > 255 {
                    return Err(RtcpError::SdesItemTooShort);
                }
                out.push(*item_type);
                out.push(bytes.len() as u8);
                out.extend_from_slice(bytes);
            }
            // item list terminator, then pad the chunk to a word boundary
            out.push(0);
            while (out.len() - start) % 4 != 0 {
                out.push(0);
            }
        }
        finish_record(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpRecord, RtcpError> {
        let chunk_count = hdr.rc_or_fmt() as usize;
        let mut chunks = Vec::with_capacity(chunk_count);
        let mut idx = 0usize;

        for _ in 0..chunk_count {
            if payload.len() < idx + 4 {
                return Err(RtcpError::Truncated);
            }
            let ssrc = u32::from_be_bytes([
                payload[idx],
                payload[idx + 1],
                payload[idx + 2],
                payload[idx + 3],
            ]);
            idx += 4;

            let mut items = Vec::new();
            loop {
                let item_type = *payload.get(idx).ok_or(RtcpError::Truncated)?;
                idx += 1;
                if item_type == 0 {
                    // chunk ends; skip padding to the next word boundary
                    while idx % 4 != 0 {
                        if *payload.get(idx).ok_or(RtcpError::Truncated)? != 0 {
                            return Err(RtcpError::SdesItemTooShort);
                        }
                        idx += 1;
                    }
                    break;
                }
                let len = *payload.get(idx).ok_or(RtcpError::SdesItemTooShort)? as usize;
                idx += 1;
                if payload.len() < idx + len {
                    return Err(RtcpError::SdesItemTooShort);
                }
                let text = String::from_utf8_lossy(&payload[idx..idx + len]).into_owned();
                idx += len;
                items.push((item_type, text));
            }
            chunks.push(SdesChunk { ssrc, items });
        }

        Ok(RtcpRecord::Sdes(Sdes { chunks }))
    }
}

impl Sdes {
    /// The usual single-chunk CNAME form that compounds an SR.
    pub fn cname(ssrc: u32, cname: impl Into<String>) -> Self {
        Self {
            chunks: vec![SdesChunk {
                ssrc,
                items: vec![(SDES_CNAME, cname.into())],
            }],
        }
    }
}
