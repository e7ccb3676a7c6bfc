//! Signed-policy and signed-token admission checks.
//!
//! Viewers append `policy=...&signature=<hex hmac>` (or `token=...`) to the
//! signalling URL. The outcome is a four-way result so a disabled check
//! ("Off") lets the caller fall through to the next one without treating it
//! as either pass or deny.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckSignatureResult {
    Pass,
    Fail,
    Error,
    Off,
}

/// Parsed policy payload; only expiry matters to the publisher.
#[derive(Debug, Clone, Default)]
pub struct SignedPolicy {
    pub expire_epoch_secs: u64,
    pub err_message: String,
}

/// Validate the `policy`/`signature` pair on a request URL.
///
/// The signature covers the URL up to (not including) `&signature=`.
pub fn check_signed_policy(url: &str, secret: Option<&str>) -> (CheckSignatureResult, SignedPolicy) {
    let Some(secret) = secret else {
        return (CheckSignatureResult::Off, SignedPolicy::default());
    };
    let Some(policy_value) = query_param(url, "policy") else {
        return (CheckSignatureResult::Off, SignedPolicy::default());
    };

    let Some(signature_pos) = url.find("&signature=") else {
        return (
            CheckSignatureResult::Fail,
            SignedPolicy {
                err_message: "signature parameter missing".into(),
                ..SignedPolicy::default()
            },
        );
    };
    let signed_part = &url[..signature_pos];
    let signature_hex = &url[signature_pos + "&signature=".len()..];
    let signature_hex = signature_hex.split('&').next().unwrap_or("");

    let Ok(expected) = hex::decode(signature_hex) else {
        return (
            CheckSignatureResult::Error,
            SignedPolicy {
                err_message: "signature is not valid hex".into(),
                ..SignedPolicy::default()
            },
        );
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return (CheckSignatureResult::Error, SignedPolicy::default());
    };
    mac.update(signed_part.as_bytes());
    if mac.verify_slice(&expected).is_err() {
        return (
            CheckSignatureResult::Fail,
            SignedPolicy {
                err_message: "signature mismatch".into(),
                ..SignedPolicy::default()
            },
        );
    }

    // policy payload: comma-separated key:value pairs, e.g. "expire:1716055230"
    let mut policy = SignedPolicy::default();
    for pair in policy_value.split(',') {
        if let Some(expire) = pair.strip_prefix("expire:") {
            match expire.parse::<u64>() {
                Ok(secs) => policy.expire_epoch_secs = secs,
                Err(_) => {
                    return (
                        CheckSignatureResult::Error,
                        SignedPolicy {
                            err_message: format!("bad expire value: {expire}"),
                            ..SignedPolicy::default()
                        },
                    );
                }
            }
        }
    }
    (CheckSignatureResult::Pass, policy)
}

/// Validate the `token` parameter: `<expire-secs>.<hex hmac over expire>`.
pub fn check_signed_token(url: &str, secret: Option<&str>) -> (CheckSignatureResult, SignedPolicy) {
    let Some(secret) = secret else {
        return (CheckSignatureResult::Off, SignedPolicy::default());
    };
    let Some(token) = query_param(url, "token") else {
        return (CheckSignatureResult::Off, SignedPolicy::default());
    };

    let Some((expire_str, signature_hex)) = token.split_once('.') else {
        return (
            CheckSignatureResult::Fail,
            SignedPolicy {
                err_message: "token has no signature part".into(),
                ..SignedPolicy::default()
            },
        );
    };
    let Ok(expected) = hex::decode(signature_hex) else {
        return (
            CheckSignatureResult::Error,
            SignedPolicy {
                err_message: "token signature is not valid hex".into(),
                ..SignedPolicy::default()
            },
        );
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return (CheckSignatureResult::Error, SignedPolicy::default());
    };
    mac.update(expire_str.as_bytes());
    if mac.verify_slice(&expected).is_err() {
        return (
            CheckSignatureResult::Fail,
            SignedPolicy {
                err_message: "token signature mismatch".into(),
                ..SignedPolicy::default()
            },
        );
    }
    match expire_str.parse::<u64>() {
        Ok(secs) => (
            CheckSignatureResult::Pass,
            SignedPolicy {
                expire_epoch_secs: secs,
                err_message: String::new(),
            },
        ),
        Err(_) => (
            CheckSignatureResult::Error,
            SignedPolicy {
                err_message: format!("bad token expire value: {expire_str}"),
                ..SignedPolicy::default()
            },
        ),
    }
}

fn query_param<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let query = url.split_once('?')?.1;
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                return Some(v);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    const SECRET: &str = "edge-secret";

    fn sign(data: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_url(expire: u64) -> String {
        let base = format!("ws://edge/app/stream?policy=expire:{expire}");
        let signature = sign(&base);
        format!("{base}&signature={signature}")
    }

    #[test]
    fn no_secret_means_off() {
        let (result, _) = check_signed_policy("ws://edge/app/s?policy=expire:1", None);
        assert_eq!(result, CheckSignatureResult::Off);
    }

    #[test]
    fn no_policy_param_means_off() {
        let (result, _) = check_signed_policy("ws://edge/app/s", Some(SECRET));
        assert_eq!(result, CheckSignatureResult::Off);
    }

    #[test]
    fn valid_signature_passes_and_extracts_expiry() {
        let url = signed_url(1_900_000_000);
        let (result, policy) = check_signed_policy(&url, Some(SECRET));
        assert_eq!(result, CheckSignatureResult::Pass);
        assert_eq!(policy.expire_epoch_secs, 1_900_000_000);
    }

    #[test]
    fn tampered_policy_fails() {
        let url = signed_url(1_900_000_000).replace("expire:19", "expire:29");
        let (result, policy) = check_signed_policy(&url, Some(SECRET));
        assert_eq!(result, CheckSignatureResult::Fail);
        assert!(!policy.err_message.is_empty());
    }

    #[test]
    fn missing_signature_fails() {
        let url = "ws://edge/app/s?policy=expire:123";
        let (result, _) = check_signed_policy(url, Some(SECRET));
        assert_eq!(result, CheckSignatureResult::Fail);
    }

    #[test]
    fn garbage_hex_is_an_error() {
        let url = "ws://edge/app/s?policy=expire:123&signature=zz-not-hex";
        let (result, _) = check_signed_policy(url, Some(SECRET));
        assert_eq!(result, CheckSignatureResult::Error);
    }

    #[test]
    fn token_roundtrip() {
        let expire = "1900000000";
        let token_url = format!("ws://edge/app/s?token={expire}.{}", sign(expire));
        let (result, policy) = check_signed_token(&token_url, Some(SECRET));
        assert_eq!(result, CheckSignatureResult::Pass);
        assert_eq!(policy.expire_epoch_secs, 1_900_000_000);
    }

    #[test]
    fn token_bad_signature_fails() {
        let token_url = format!("ws://edge/app/s?token=1900000000.{}", sign("other"));
        let (result, _) = check_signed_token(&token_url, Some(SECRET));
        assert_eq!(result, CheckSignatureResult::Fail);
    }
}
