use std::fmt;
use std::str::FromStr;

use crate::sdp::sdp_error::SdpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            _ => Err(SdpError::Invalid("m= media kind")),
        }
    }
}

/// One `a=rtpmap:` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMap {
    pub payload_type: u8,
    pub encoding: String,
    pub clock_rate: u32,
    pub channels: Option<u8>,
}

impl PayloadMap {
    pub fn new(payload_type: u8, encoding: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            payload_type,
            encoding: encoding.into(),
            clock_rate,
            channels: None,
        }
    }
}

impl fmt::Display for PayloadMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channels {
            Some(ch) => write!(
                f,
                "{} {}/{}/{}",
                self.payload_type, self.encoding, self.clock_rate, ch
            ),
            None => write!(f, "{} {}/{}", self.payload_type, self.encoding, self.clock_rate),
        }
    }
}

/// One `m=` section with the attributes the egress core cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub kind: MediaKind,
    pub payloads: Vec<PayloadMap>,
    pub ssrc: u32,
    pub cname: String,
}

impl MediaDescription {
    pub fn new(kind: MediaKind, ssrc: u32, cname: impl Into<String>) -> Self {
        Self {
            kind,
            payloads: Vec::new(),
            ssrc,
            cname: cname.into(),
        }
    }

    pub fn with_payload(mut self, payload: PayloadMap) -> Self {
        self.payloads.push(payload);
        self
    }

    pub fn render_into(&self, out: &mut String) {
        let pts: Vec<String> = self
            .payloads
            .iter()
            .map(|p| p.payload_type.to_string())
            .collect();
        out.push_str(&format!(
            "m={} 9 UDP/TLS/RTP/SAVPF {}\r\n",
            self.kind,
            pts.join(" ")
        ));
        out.push_str("c=IN IP4 0.0.0.0\r\n");
        for payload in &self.payloads {
            out.push_str(&format!("a=rtpmap:{payload}\r\n"));
        }
        out.push_str(&format!("a=ssrc:{} cname:{}\r\n", self.ssrc, self.cname));
        out.push_str("a=sendonly\r\na=rtcp-mux\r\n");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn renders_media_section() {
        let media = MediaDescription::new(MediaKind::Video, 777, "edge")
            .with_payload(PayloadMap::new(96, "H264", 90_000));
        let mut out = String::new();
        media.render_into(&mut out);
        assert!(out.starts_with("m=video 9 UDP/TLS/RTP/SAVPF 96\r\n"));
        assert!(out.contains("a=rtpmap:96 H264/90000\r\n"));
        assert!(out.contains("a=ssrc:777 cname:edge\r\n"));
        assert!(out.contains("a=rtcp-mux"));
    }

    #[test]
    fn audio_channels_rendered() {
        let mut payload = PayloadMap::new(111, "opus", 48_000);
        payload.channels = Some(2);
        assert_eq!(payload.to_string(), "111 opus/48000/2");
    }
}
