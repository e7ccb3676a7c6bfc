use super::{
    bye::Bye,
    common_header::CommonHeader,
    feedback::Feedback,
    packet_type::{self, RtcpRecordType},
    receiver_report::ReceiverReport,
    rtcp_error::RtcpError,
    sdes::Sdes,
    sender_report::SenderReport,
};

/// The union of supported RTCP records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpRecord {
    Sr(SenderReport),
    Rr(ReceiverReport),
    Sdes(Sdes),
    Bye(Bye),
    Feedback(Feedback),
}

impl RtcpRecord {
    /// Decode a *compound* RTCP buffer into individual records.
    ///
    /// A well-formed compound starts with an SR or RR; anything else is
    /// rejected so garbage cannot masquerade as control traffic.
    pub fn decode_compound(buf: &[u8]) -> Result<Vec<RtcpRecord>, RtcpError> {
        let mut out = Vec::new();
        let mut idx = 0usize;
        while idx + 4 <= buf.len() {
            let (hdr, total) = CommonHeader::decode(&buf[idx..])?;

            if out.is_empty()
                && hdr.pt() != packet_type::PT_SR
                && hdr.pt() != packet_type::PT_RR
            {
                return Err(RtcpError::BadFirstRecord(hdr.pt()));
            }

            let payload = &buf[idx + 4..idx + total];
            let record = match hdr.pt() {
                packet_type::PT_SR => SenderReport::decode(&hdr, payload)?,
                packet_type::PT_RR => ReceiverReport::decode(&hdr, payload)?,
                packet_type::PT_SDES => Sdes::decode(&hdr, payload)?,
                packet_type::PT_BYE => Bye::decode(&hdr, payload)?,
                packet_type::PT_RTPFB | packet_type::PT_PSFB => Feedback::decode(&hdr, payload)?,
                other => return Err(RtcpError::UnknownPacketType(other)),
            };
            out.push(record);
            idx += total;
        }
        if idx != buf.len() || out.is_empty() {
            // trailing garbage / partial packet / empty compound
            return Err(RtcpError::TooShort);
        }
        Ok(out)
    }

    /// Encode a compound RTCP packet (concatenation of records).
    pub fn encode_compound(records: &[RtcpRecord]) -> Result<Vec<u8>, RtcpError> {
        let mut out = Vec::new();
        for record in records {
            record.encode_into(&mut out)?;
        }
        Ok(out)
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        match self {
            RtcpRecord::Sr(sr) => sr.encode_into(out),
            RtcpRecord::Rr(rr) => rr.encode_into(out),
            RtcpRecord::Sdes(sdes) => sdes.encode_into(out),
            RtcpRecord::Bye(bye) => bye.encode_into(out),
            RtcpRecord::Feedback(fb) => fb.encode_into(out),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::super::{report_block::ReportBlock, sender_info::SenderInfo};
    use super::*;

    fn sample_sr() -> SenderReport {
        SenderReport::new(
            0x1234_5678,
            SenderInfo::new(0xE000_0000, 0x8000_0000, 90_000, 1_000, 200_000),
            vec![ReportBlock {
                ssrc: 0x9999_0000,
                fraction_lost: 3,
                cumulative_lost: 12,
                highest_seq_no_received: 5_000,
                interarrival_jitter: 42,
                lsr: 7,
                dlsr: 8,
            }],
        )
    }

    #[test]
    fn sr_roundtrip_is_byte_identical() {
        let compound =
            RtcpRecord::encode_compound(&[RtcpRecord::Sr(sample_sr())]).unwrap();
        let parsed = RtcpRecord::decode_compound(&compound).unwrap();
        let again = RtcpRecord::encode_compound(&parsed).unwrap();
        assert_eq!(compound, again);
    }

    #[test]
    fn sr_sdes_compound_roundtrip() {
        let records = vec![
            RtcpRecord::Sr(sample_sr()),
            RtcpRecord::Sdes(Sdes::cname(0x1234_5678, "edge@streamedge")),
        ];
        let wire = RtcpRecord::encode_compound(&records).unwrap();
        let parsed = RtcpRecord::decode_compound(&wire).unwrap();
        assert_eq!(parsed, records);
        assert_eq!(RtcpRecord::encode_compound(&parsed).unwrap(), wire);
    }

    #[test]
    fn compound_must_start_with_report() {
        let sdes = RtcpRecord::Sdes(Sdes::cname(1, "x"));
        let wire = RtcpRecord::encode_compound(&[sdes]).unwrap();
        assert!(matches!(
            RtcpRecord::decode_compound(&wire),
            Err(RtcpError::BadFirstRecord(202))
        ));
    }

    #[test]
    fn trailing_garbage_rejected() {
        let mut wire = RtcpRecord::encode_compound(&[RtcpRecord::Sr(sample_sr())]).unwrap();
        wire.extend_from_slice(&[0xAA, 0xBB]);
        assert!(RtcpRecord::decode_compound(&wire).is_err());
    }

    #[test]
    fn empty_buffer_rejected() {
        assert!(RtcpRecord::decode_compound(&[]).is_err());
    }

    #[test]
    fn bye_with_reason_roundtrips() {
        let records = vec![
            RtcpRecord::Rr(ReceiverReport::new(5, vec![])),
            RtcpRecord::Bye(Bye {
                ssrcs: vec![5],
                reason: Some("teardown".into()),
            }),
        ];
        let wire = RtcpRecord::encode_compound(&records).unwrap();
        let parsed = RtcpRecord::decode_compound(&wire).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn feedback_record_roundtrips_opaque() {
        let records = vec![
            RtcpRecord::Rr(ReceiverReport::new(5, vec![])),
            RtcpRecord::Feedback(Feedback {
                pt: 206,
                fmt: 1,
                sender_ssrc: 1,
                media_ssrc: 2,
                fci: vec![],
            }),
        ];
        let wire = RtcpRecord::encode_compound(&records).unwrap();
        let parsed = RtcpRecord::decode_compound(&wire).unwrap();
        assert_eq!(parsed, records);
    }
}
