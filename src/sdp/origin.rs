use std::{fmt, str::FromStr};

use crate::sdp::sdp_error::SdpError;

/// The `o=` line of a session description.
///
/// The publisher rewrites this on every offer: the username is the server
/// name and the session id is the freshly issued viewer session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub net_type: String,
    pub addr_type: String,
    pub unicast_address: String,
}

impl Origin {
    pub fn new(
        username: impl Into<String>,
        session_id: u64,
        session_version: u64,
        unicast_address: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            session_id,
            session_version,
            net_type: "IN".to_string(),
            addr_type: "IP4".to_string(),
            unicast_address: unicast_address.into(),
        }
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::new("-", 0, 2, "127.0.0.1")
    }
}

impl FromStr for Origin {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // username sess-id sess-version nettype addrtype unicast
        let parts: Vec<_> = s.split_whitespace().collect();
        if parts.len() != 6 {
            return Err(SdpError::Invalid("o="));
        }
        Ok(Self {
            username: parts[0].to_owned(),
            session_id: parts[1].parse::<u64>()?,
            session_version: parts[2].parse::<u64>()?,
            net_type: parts[3].to_owned(),
            addr_type: parts[4].to_owned(),
            unicast_address: parts[5].to_owned(),
        })
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.username,
            self.session_id,
            self.session_version,
            self.net_type,
            self.addr_type,
            self.unicast_address
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn parse_and_render() {
        let o: Origin = "streamedge 42 2 IN IP4 127.0.0.1".parse().unwrap();
        assert_eq!(o.username, "streamedge");
        assert_eq!(o.session_id, 42);
        assert_eq!(o.to_string(), "streamedge 42 2 IN IP4 127.0.0.1");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(Origin::from_str("only three fields").is_err());
    }

    #[test]
    fn rejects_non_numeric_session_id() {
        assert!(Origin::from_str("u abc 2 IN IP4 127.0.0.1").is_err());
    }
}
