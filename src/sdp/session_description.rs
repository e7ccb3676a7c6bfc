use std::fmt;
use std::str::FromStr;

use crate::sdp::media::{MediaDescription, MediaKind, PayloadMap};
use crate::sdp::origin::Origin;
use crate::sdp::sdp_error::SdpError;

/// A session description restricted to what the egress path negotiates:
/// origin, ICE credentials, DTLS fingerprint/setup and the media sections.
///
/// The canonical description lives on the stream; offers are cloned from it
/// with a rewritten origin and fresh ICE credentials.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionDescription {
    pub origin: Origin,
    pub session_name: String,
    pub ice_ufrag: String,
    pub ice_pwd: String,
    /// e.g. `sha-256 AB:CD:...`
    pub fingerprint: Option<String>,
    /// actpass / active / passive
    pub setup: Option<String>,
    pub media: Vec<MediaDescription>,
}

impl SessionDescription {
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            origin: Origin::default(),
            session_name: session_name.into(),
            ice_ufrag: String::new(),
            ice_pwd: String::new(),
            fingerprint: None,
            setup: None,
            media: Vec::new(),
        }
    }

    /// Rewrite the origin line the way an offer hands it out: server name as
    /// username and the issued session id.
    pub fn set_origin(&mut self, username: &str, session_id: u64, address: &str) {
        self.origin = Origin::new(username, session_id, 2, address);
    }

    pub fn session_id(&self) -> u64 {
        self.origin.session_id
    }

    pub fn add_media(&mut self, media: MediaDescription) {
        self.media.push(media);
    }

    pub fn parse(text: &str) -> Result<Self, SdpError> {
        let mut description = Self::new("");
        let mut seen_origin = false;
        let mut current_media: Option<MediaDescription> = None;

        for raw in text.lines() {
            let line = raw.trim_end();
            if line.len() < 2 {
                continue;
            }
            let (prefix, value) = line.split_at(2);
            match prefix {
                "o=" => {
                    description.origin = Origin::from_str(value)?;
                    seen_origin = true;
                }
                "s=" => description.session_name = value.to_string(),
                "m=" => {
                    if let Some(done) = current_media.take() {
                        description.media.push(done);
                    }
                    let mut fields = value.split_whitespace();
                    let kind: MediaKind = fields.next().ok_or(SdpError::Invalid("m="))?.parse()?;
                    current_media = Some(MediaDescription::new(kind, 0, ""));
                }
                "a=" => Self::parse_attribute(value, &mut description, &mut current_media)?,
                _ => {}
            }
        }
        if let Some(done) = current_media.take() {
            description.media.push(done);
        }
        if !seen_origin {
            return Err(SdpError::MissingLine("o="));
        }
        Ok(description)
    }

    fn parse_attribute(
        value: &str,
        description: &mut Self,
        current_media: &mut Option<MediaDescription>,
    ) -> Result<(), SdpError> {
        if let Some(ufrag) = value.strip_prefix("ice-ufrag:") {
            description.ice_ufrag = ufrag.to_string();
        } else if let Some(pwd) = value.strip_prefix("ice-pwd:") {
            description.ice_pwd = pwd.to_string();
        } else if let Some(fp) = value.strip_prefix("fingerprint:") {
            description.fingerprint = Some(fp.to_string());
        } else if let Some(setup) = value.strip_prefix("setup:") {
            description.setup = Some(setup.to_string());
        } else if let Some(rtpmap) = value.strip_prefix("rtpmap:") {
            let Some(media) = current_media.as_mut() else {
                return Ok(());
            };
            // "<pt> <encoding>/<clock>[/<channels>]"
            let mut fields = rtpmap.split_whitespace();
            let pt: u8 = fields.next().ok_or(SdpError::Invalid("a=rtpmap"))?.parse()?;
            let spec = fields.next().ok_or(SdpError::Invalid("a=rtpmap"))?;
            let mut parts = spec.split('/');
            let encoding = parts.next().ok_or(SdpError::Invalid("a=rtpmap"))?;
            let clock_rate: u32 = parts.next().ok_or(SdpError::Invalid("a=rtpmap"))?.parse()?;
            let mut payload = PayloadMap::new(pt, encoding, clock_rate);
            if let Some(ch) = parts.next() {
                payload.channels = Some(ch.parse()?);
            }
            media.payloads.push(payload);
        } else if let Some(ssrc_line) = value.strip_prefix("ssrc:") {
            let Some(media) = current_media.as_mut() else {
                return Ok(());
            };
            let mut fields = ssrc_line.split_whitespace();
            media.ssrc = fields.next().ok_or(SdpError::Invalid("a=ssrc"))?.parse()?;
            if let Some(cname) = fields.next().and_then(|f| f.strip_prefix("cname:")) {
                media.cname = cname.to_string();
            }
        }
        Ok(())
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        out.push_str("v=0\r\n");
        out.push_str(&format!("o={}\r\n", self.origin));
        out.push_str(&format!("s={}\r\n", self.session_name));
        out.push_str("t=0 0\r\n");
        if !self.ice_ufrag.is_empty() {
            out.push_str(&format!("a=ice-ufrag:{}\r\n", self.ice_ufrag));
        }
        if !self.ice_pwd.is_empty() {
            out.push_str(&format!("a=ice-pwd:{}\r\n", self.ice_pwd));
        }
        if let Some(fp) = &self.fingerprint {
            out.push_str(&format!("a=fingerprint:{fp}\r\n"));
        }
        if let Some(setup) = &self.setup {
            out.push_str(&format!("a=setup:{setup}\r\n"));
        }
        for media in &self.media {
            media.render_into(&mut out);
        }
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn sample() -> SessionDescription {
        let mut description = SessionDescription::new("stream1");
        description.set_origin("streamedge", 17, "127.0.0.1");
        description.ice_ufrag = "Ufrag123".into();
        description.ice_pwd = "PwdPwdPwdPwdPwdPwdPwd".into();
        description.fingerprint = Some("sha-256 AA:BB:CC".into());
        description.setup = Some("actpass".into());
        description.add_media(
            MediaDescription::new(MediaKind::Video, 1111, "edge")
                .with_payload(PayloadMap::new(96, "H264", 90_000)),
        );
        let mut opus = PayloadMap::new(111, "opus", 48_000);
        opus.channels = Some(2);
        description
            .add_media(MediaDescription::new(MediaKind::Audio, 2222, "edge").with_payload(opus));
        description
    }

    #[test]
    fn parse_back_preserves_media_ufrag_and_origin_id() {
        let description = sample();
        let text = description.to_string();
        let parsed = SessionDescription::parse(&text).unwrap();

        assert_eq!(parsed.session_id(), 17);
        assert_eq!(parsed.ice_ufrag, "Ufrag123");
        assert_eq!(parsed.media, description.media);
        assert_eq!(parsed.fingerprint, description.fingerprint);
    }

    #[test]
    fn missing_origin_is_an_error() {
        assert!(matches!(
            SessionDescription::parse("v=0\r\ns=x\r\n"),
            Err(SdpError::MissingLine("o="))
        ));
    }

    #[test]
    fn media_kind_must_be_known() {
        let text = "v=0\r\no=- 1 2 IN IP4 0.0.0.0\r\nm=application 9 UDP x\r\n";
        assert!(SessionDescription::parse(text).is_err());
    }
}
