/// Codec identifier for an encoded track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    H264,
    Vp8,
    Opus,
    Aac,
}

impl CodecId {
    pub fn is_video(self) -> bool {
        matches!(self, Self::H264 | Self::Vp8)
    }

    /// Codecs a WebRTC peer can consume (video: VP8/H.264; audio: Opus).
    pub fn peer_supported(self) -> bool {
        matches!(self, Self::H264 | Self::Vp8 | Self::Opus)
    }

    pub fn encoding_name(self) -> &'static str {
        match self {
            Self::H264 => "H264",
            Self::Vp8 => "VP8",
            Self::Opus => "opus",
            Self::Aac => "mpeg4-generic",
        }
    }
}

/// One encoded media track of a stream. Immutable after stream start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: u32,
    pub codec: CodecId,
    /// Timestamp rate in Hz (90 kHz video, codec rate for audio).
    pub clock_rate: u32,
    pub bitrate_bps: u32,
    /// Egress SSRC stamped on every packet of this track.
    pub ssrc: u32,
    pub payload_type: u8,
}

impl MediaTrack {
    pub fn new(
        id: u32,
        codec: CodecId,
        clock_rate: u32,
        bitrate_bps: u32,
        ssrc: u32,
        payload_type: u8,
    ) -> Self {
        Self {
            id,
            codec,
            clock_rate,
            bitrate_bps,
            ssrc,
            payload_type,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn peer_supported_subset() {
        assert!(CodecId::H264.peer_supported());
        assert!(CodecId::Vp8.peer_supported());
        assert!(CodecId::Opus.peer_supported());
        assert!(!CodecId::Aac.peer_supported());
    }
}
