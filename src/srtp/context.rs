use std::collections::HashMap;
use std::sync::Arc;

use aes::cipher::{KeyIvInit, StreamCipher};
use byteorder::{BigEndian, ByteOrder};
use hmac::Mac;

use crate::log::log_sink::LogSink;
use crate::srtp::constants::{
    AUTH_TAG_LEN, SRTCP_E_BIT, SRTCP_INDEX_LEN, SRTCP_LABEL_AUTH, SRTCP_LABEL_ENCRYPTION,
    SRTCP_LABEL_SALT, SRTP_LABEL_AUTH, SRTP_LABEL_ENCRYPTION, SRTP_LABEL_SALT,
};
use crate::srtp::endpoint_keys::SrtpEndpointKeys;
use crate::srtp::replay_window::ReplayWindow;
use crate::srtp::session_keys::SessionKeys;
use crate::srtp::srtp_error::SrtpError;
use crate::srtp::utils::{
    Aes128Ctr, HmacSha1, compute_iv, constant_time_eq, derive_session_keys, get_rtp_header_len,
};
use crate::{sink_trace, sink_warn};

/// One direction of SRTP/SRTCP protection.
///
/// The egress node holds two of these: an outbound context keyed with our
/// master material and an inbound one keyed with the peer's.
pub struct SrtpContext {
    logger: Arc<dyn LogSink>,
    rtp_keys: SessionKeys,
    rtcp_keys: SessionKeys,
    rocs: HashMap<u32, u32>,
    last_seqs: HashMap<u32, u16>,
    replay_windows: HashMap<u32, ReplayWindow>,
    srtcp_tx_index: u32,
    srtcp_replay: HashMap<u32, ReplayWindow>,
}

impl SrtpContext {
    pub fn new(logger: Arc<dyn LogSink>, master: &SrtpEndpointKeys) -> Self {
        let rtp_keys = derive_session_keys(
            master,
            (SRTP_LABEL_ENCRYPTION, SRTP_LABEL_AUTH, SRTP_LABEL_SALT),
        );
        let rtcp_keys = derive_session_keys(
            master,
            (SRTCP_LABEL_ENCRYPTION, SRTCP_LABEL_AUTH, SRTCP_LABEL_SALT),
        );

        Self {
            logger,
            rtp_keys,
            rtcp_keys,
            rocs: HashMap::new(),
            last_seqs: HashMap::new(),
            replay_windows: HashMap::new(),
            srtcp_tx_index: 0,
            srtcp_replay: HashMap::new(),
        }
    }

    /// Encrypt and authenticate an RTP packet in place, appending the tag.
    pub fn protect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if packet.len() < 12 {
            return Err(SrtpError::TooShort);
        }
        let seq = BigEndian::read_u16(&packet[2..4]);
        let ssrc = BigEndian::read_u32(&packet[8..12]);
        let roc = self.advance_roc(ssrc, seq);
        let index = ((roc as u64) << 16) | (seq as u64);

        let header_len = get_rtp_header_len(packet)?;

        let iv = compute_iv(&self.rtp_keys.salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(&self.rtp_keys.enc_key.into(), &iv.into());
        cipher.apply_keystream(&mut packet[header_len..]);

        let mut mac = HmacSha1::new_from_slice(&self.rtp_keys.auth_key)
            .map_err(|_| SrtpError::BadKeyLength)?;
        mac.update(packet);
        let mut roc_bytes = [0u8; 4];
        BigEndian::write_u32(&mut roc_bytes, roc);
        mac.update(&roc_bytes);
        let result = mac.finalize().into_bytes();
        packet.extend_from_slice(&result[..AUTH_TAG_LEN]);

        sink_trace!(
            self.logger,
            "[SRTP] protected ssrc={:#x} seq={} roc={} len={}",
            ssrc,
            seq,
            roc,
            packet.len()
        );
        Ok(())
    }

    /// Verify and decrypt an SRTP packet in place, stripping the tag.
    pub fn unprotect_rtp(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if packet.len() < 12 + AUTH_TAG_LEN {
            return Err(SrtpError::TooShort);
        }

        let tag_start = packet.len() - AUTH_TAG_LEN;
        let (content, received_tag) = packet.split_at(tag_start);

        let seq = BigEndian::read_u16(&content[2..4]);
        let ssrc = BigEndian::read_u32(&content[8..12]);
        let roc = self.estimate_roc(ssrc, seq);
        let index = ((roc as u64) << 16) | (seq as u64);

        let window = self.replay_windows.entry(ssrc).or_insert_with(ReplayWindow::new);
        if window.is_replay(index) {
            sink_warn!(
                self.logger,
                "[SRTP] replay detected: ssrc={:#x} seq={}",
                ssrc,
                seq
            );
            return Err(SrtpError::Replay { ssrc, index });
        }

        let mut mac = HmacSha1::new_from_slice(&self.rtp_keys.auth_key)
            .map_err(|_| SrtpError::BadKeyLength)?;
        mac.update(content);
        let mut roc_bytes = [0u8; 4];
        BigEndian::write_u32(&mut roc_bytes, roc);
        mac.update(&roc_bytes);
        let expected = mac.finalize().into_bytes();
        if !constant_time_eq(&expected[..AUTH_TAG_LEN], received_tag) {
            return Err(SrtpError::AuthFail { ssrc });
        }

        packet.truncate(tag_start);
        let header_len = get_rtp_header_len(packet)?;
        let iv = compute_iv(&self.rtp_keys.salt, ssrc, index);
        let mut cipher = Aes128Ctr::new(&self.rtp_keys.enc_key.into(), &iv.into());
        cipher.apply_keystream(&mut packet[header_len..]);

        self.commit_roc(ssrc, seq, roc);
        if let Some(window) = self.replay_windows.get_mut(&ssrc) {
            window.record(index);
        }
        Ok(())
    }

    /// Encrypt and authenticate a compound RTCP packet in place,
    /// appending the E+index word and the tag.
    pub fn protect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if packet.len() < 8 {
            return Err(SrtpError::TooShort);
        }
        let ssrc = BigEndian::read_u32(&packet[4..8]);
        self.srtcp_tx_index = (self.srtcp_tx_index + 1) & 0x7FFF_FFFF;
        let index = self.srtcp_tx_index;

        // The first 8 bytes (header + sender SSRC) stay in the clear.
        let iv = compute_iv(&self.rtcp_keys.salt, ssrc, index as u64);
        let mut cipher = Aes128Ctr::new(&self.rtcp_keys.enc_key.into(), &iv.into());
        cipher.apply_keystream(&mut packet[8..]);

        let mut index_word = [0u8; SRTCP_INDEX_LEN];
        BigEndian::write_u32(&mut index_word, SRTCP_E_BIT | index);
        packet.extend_from_slice(&index_word);

        let mut mac = HmacSha1::new_from_slice(&self.rtcp_keys.auth_key)
            .map_err(|_| SrtpError::BadKeyLength)?;
        mac.update(packet);
        let result = mac.finalize().into_bytes();
        packet.extend_from_slice(&result[..AUTH_TAG_LEN]);
        Ok(())
    }

    /// Verify and decrypt an SRTCP packet in place, stripping trailer + tag.
    pub fn unprotect_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        if packet.len() < 8 + SRTCP_INDEX_LEN + AUTH_TAG_LEN {
            return Err(SrtpError::TooShort);
        }

        let tag_start = packet.len() - AUTH_TAG_LEN;
        let (content, received_tag) = packet.split_at(tag_start);

        let mut mac = HmacSha1::new_from_slice(&self.rtcp_keys.auth_key)
            .map_err(|_| SrtpError::BadKeyLength)?;
        mac.update(content);
        let expected = mac.finalize().into_bytes();
        let ssrc = BigEndian::read_u32(&content[4..8]);
        if !constant_time_eq(&expected[..AUTH_TAG_LEN], received_tag) {
            return Err(SrtpError::AuthFail { ssrc });
        }

        let index_word = BigEndian::read_u32(&content[tag_start - SRTCP_INDEX_LEN..tag_start]);
        let encrypted = (index_word & SRTCP_E_BIT) != 0;
        let index = index_word & 0x7FFF_FFFF;

        let window = self.srtcp_replay.entry(ssrc).or_insert_with(ReplayWindow::new);
        if window.is_replay(index as u64) {
            return Err(SrtpError::Replay {
                ssrc,
                index: index as u64,
            });
        }
        window.record(index as u64);

        packet.truncate(tag_start - SRTCP_INDEX_LEN);
        if encrypted {
            let iv = compute_iv(&self.rtcp_keys.salt, ssrc, index as u64);
            let mut cipher = Aes128Ctr::new(&self.rtcp_keys.enc_key.into(), &iv.into());
            cipher.apply_keystream(&mut packet[8..]);
        }
        Ok(())
    }

    /// Outbound rollover counter: advance on sequence wrap.
    fn advance_roc(&mut self, ssrc: u32, seq: u16) -> u32 {
        let roc = self.rocs.entry(ssrc).or_insert(0);
        if let Some(last) = self.last_seqs.get(&ssrc) {
            if *last > 0xF000 && seq < 0x1000 {
                *roc = roc.wrapping_add(1);
            }
        }
        self.last_seqs.insert(ssrc, seq);
        *self.rocs.get(&ssrc).unwrap_or(&0)
    }

    /// Inbound rollover estimate per RFC 3711 §3.3.1.
    fn estimate_roc(&self, ssrc: u32, seq: u16) -> u32 {
        let roc = *self.rocs.get(&ssrc).unwrap_or(&0);
        let Some(last) = self.last_seqs.get(&ssrc) else {
            return roc;
        };
        if *last > 0xF000 && seq < 0x1000 {
            roc.wrapping_add(1)
        } else if *last < 0x1000 && seq > 0xF000 {
            roc.wrapping_sub(1)
        } else {
            roc
        }
    }

    /// Only move the stored index forward; reordered packets must not
    /// regress the rollover state.
    fn commit_roc(&mut self, ssrc: u32, seq: u16, roc: u32) {
        let cur_roc = *self.rocs.get(&ssrc).unwrap_or(&0);
        let cur_seq = *self.last_seqs.get(&ssrc).unwrap_or(&0);
        let cur_index = ((cur_roc as u64) << 16) | cur_seq as u64;
        let new_index = ((roc as u64) << 16) | seq as u64;
        if new_index >= cur_index {
            self.rocs.insert(ssrc, roc);
            self.last_seqs.insert(ssrc, seq);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::rtp::RtpPacket;

    fn keys() -> SrtpEndpointKeys {
        SrtpEndpointKeys {
            master_key: (0u8..16).collect(),
            master_salt: (100u8..114).collect(),
        }
    }

    fn sample_rtp() -> Vec<u8> {
        RtpPacket::build(96, false, 1000, 90_000, 0xDEAD_BEEF, &[], b"media payload")
            .unwrap()
            .data()
            .to_vec()
    }

    #[test]
    fn rtp_protect_unprotect_roundtrip() {
        let mut tx = SrtpContext::new(Arc::new(NoopLogSink), &keys());
        let mut rx = SrtpContext::new(Arc::new(NoopLogSink), &keys());

        let clear = sample_rtp();
        let mut wire = clear.clone();
        tx.protect_rtp(&mut wire).unwrap();
        assert_eq!(wire.len(), clear.len() + AUTH_TAG_LEN);
        assert_ne!(&wire[12..clear.len()], &clear[12..]);

        rx.unprotect_rtp(&mut wire).unwrap();
        assert_eq!(wire, clear);
    }

    #[test]
    fn rtp_replay_is_rejected() {
        let mut tx = SrtpContext::new(Arc::new(NoopLogSink), &keys());
        let mut rx = SrtpContext::new(Arc::new(NoopLogSink), &keys());

        let mut wire = sample_rtp();
        tx.protect_rtp(&mut wire).unwrap();
        let replayed = wire.clone();

        rx.unprotect_rtp(&mut wire).unwrap();
        let mut again = replayed;
        assert!(matches!(
            rx.unprotect_rtp(&mut again),
            Err(SrtpError::Replay { .. })
        ));
    }

    #[test]
    fn rtp_tampering_fails_auth() {
        let mut tx = SrtpContext::new(Arc::new(NoopLogSink), &keys());
        let mut rx = SrtpContext::new(Arc::new(NoopLogSink), &keys());

        let mut wire = sample_rtp();
        tx.protect_rtp(&mut wire).unwrap();
        let mid = wire.len() / 2;
        wire[mid] ^= 0xFF;
        assert!(matches!(
            rx.unprotect_rtp(&mut wire),
            Err(SrtpError::AuthFail { .. })
        ));
    }

    #[test]
    fn rtcp_protect_unprotect_roundtrip() {
        use crate::rtcp::{RtcpRecord, receiver_report::ReceiverReport};

        let mut tx = SrtpContext::new(Arc::new(NoopLogSink), &keys());
        let mut rx = SrtpContext::new(Arc::new(NoopLogSink), &keys());

        let clear =
            RtcpRecord::encode_compound(&[RtcpRecord::Rr(ReceiverReport::new(7, vec![]))])
                .unwrap();
        let mut wire = clear.clone();
        tx.protect_rtcp(&mut wire).unwrap();
        assert_eq!(wire.len(), clear.len() + SRTCP_INDEX_LEN + AUTH_TAG_LEN);

        rx.unprotect_rtcp(&mut wire).unwrap();
        assert_eq!(wire, clear);
    }

    #[test]
    fn rtcp_index_advances_per_packet() {
        let mut tx = SrtpContext::new(Arc::new(NoopLogSink), &keys());
        let mut rx = SrtpContext::new(Arc::new(NoopLogSink), &keys());
        use crate::rtcp::{RtcpRecord, receiver_report::ReceiverReport};
        let clear =
            RtcpRecord::encode_compound(&[RtcpRecord::Rr(ReceiverReport::new(7, vec![]))])
                .unwrap();

        for _ in 0..3 {
            let mut wire = clear.clone();
            tx.protect_rtcp(&mut wire).unwrap();
            rx.unprotect_rtcp(&mut wire).unwrap();
            assert_eq!(wire, clear);
        }
    }
}
