use std::sync::Arc;

use openssl::hash::MessageDigest;
use openssl::ssl::{
    HandshakeError, Ssl, SslContextBuilder, SslFiletype, SslMethod, SslStream, SslVerifyMode,
};
use openssl::x509::X509;

use crate::dtls::{
    datagram_channel::DatagramChannel, dtls_error::DtlsError, dtls_role::DtlsRole,
};
use crate::log::log_sink::LogSink;
use crate::srtp::{SrtpEndpointKeys, SrtpProfile, SrtpSessionConfig};
use crate::{sink_debug, sink_info, sink_warn};

const SRTP_PROFILE_NAME: &str = "SRTP_AES128_CM_SHA1_80";
const KEYING_LABEL: &str = "EXTRACTOR-dtls_srtp";

/// Certificate + key paths loaded from configuration at publisher start.
#[derive(Debug, Clone)]
pub struct DtlsIdentity {
    pub cert_path: String,
    pub key_path: String,
}

/// Run the DTLS-SRTP handshake over an in-pipeline datagram channel and
/// derive the SRTP session config from the exported keying material.
pub fn run_dtls_handshake(
    channel: DatagramChannel,
    role: DtlsRole,
    identity: &DtlsIdentity,
    expected_fingerprint: Option<String>,
    logger: Arc<dyn LogSink>,
) -> Result<SrtpSessionConfig, DtlsError> {
    sink_info!(
        &logger,
        "[DTLS] starting handshake as {:?}, fingerprint pinned: {}",
        role,
        expected_fingerprint.is_some()
    );

    let builder = create_base_context(logger.clone(), identity, expected_fingerprint)?;
    let ssl =
        Ssl::new(&builder.build()).map_err(|e| DtlsError::Ssl(format!("Ssl::new failed: {e}")))?;

    let stream = match role {
        DtlsRole::Server => ssl.accept(channel),
        DtlsRole::Client => ssl.connect(channel),
    }
    .map_err(handshake_error_to_dtlserr)?;

    let cfg = derive_srtp_keys(&stream, role)?;
    sink_info!(&logger, "[DTLS] handshake complete, SRTP keys derived");
    Ok(cfg)
}

/// `sha-256` colon-hex fingerprint of our certificate for the offer SDP.
pub fn certificate_fingerprint(cert_path: &str) -> Result<String, DtlsError> {
    let pem = std::fs::read(cert_path)?;
    let cert =
        X509::from_pem(&pem).map_err(|e| DtlsError::Ssl(format!("bad certificate: {e}")))?;
    let digest = cert
        .digest(MessageDigest::sha256())
        .map_err(|e| DtlsError::Ssl(format!("digest failed: {e}")))?;
    Ok(colon_hex(&digest))
}

pub(crate) fn colon_hex(digest: &[u8]) -> String {
    let plain = hex::encode_upper(digest);
    plain
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(":")
}

fn derive_srtp_keys(
    stream: &SslStream<DatagramChannel>,
    role: DtlsRole,
) -> Result<SrtpSessionConfig, DtlsError> {
    let selected = stream
        .ssl()
        .selected_srtp_profile()
        .ok_or(DtlsError::NoSrtpProfile)?;
    if selected.name() != SRTP_PROFILE_NAME {
        return Err(DtlsError::NoSrtpProfile);
    }

    let key_len = 16usize;
    let salt_len = 14usize;
    let total_len = 2 * (key_len + salt_len);

    let mut key_mat = vec![0u8; total_len];
    stream
        .ssl()
        .export_keying_material(&mut key_mat, KEYING_LABEL, None)
        .map_err(|e| DtlsError::KeyExport(format!("{e}")))?;

    let (client_key, rest) = key_mat.split_at(key_len);
    let (server_key, rest) = rest.split_at(key_len);
    let (client_salt, rest) = rest.split_at(salt_len);
    let (server_salt, _) = rest.split_at(salt_len);

    let client_keys = SrtpEndpointKeys {
        master_key: client_key.to_vec(),
        master_salt: client_salt.to_vec(),
    };
    let server_keys = SrtpEndpointKeys {
        master_key: server_key.to_vec(),
        master_salt: server_salt.to_vec(),
    };

    let (outbound, inbound) = match role {
        DtlsRole::Client => (client_keys, server_keys),
        DtlsRole::Server => (server_keys, client_keys),
    };

    Ok(SrtpSessionConfig {
        profile: SrtpProfile::Aes128CmHmacSha1_80,
        outbound,
        inbound,
    })
}

fn create_base_context(
    logger: Arc<dyn LogSink>,
    identity: &DtlsIdentity,
    expected_fingerprint: Option<String>,
) -> Result<SslContextBuilder, DtlsError> {
    let mut builder = SslContextBuilder::new(SslMethod::dtls())
        .map_err(|e| DtlsError::Ssl(format!("OpenSSL init failed: {e}")))?;

    builder
        .set_tlsext_use_srtp(SRTP_PROFILE_NAME)
        .map_err(|e| DtlsError::Ssl(format!("set_tlsext_use_srtp failed: {e}")))?;

    builder
        .set_certificate_chain_file(&identity.cert_path)
        .map_err(|e| DtlsError::Ssl(format!("set_certificate_chain_file failed: {e}")))?;
    builder
        .set_private_key_file(&identity.key_path, SslFiletype::PEM)
        .map_err(|e| DtlsError::Ssl(format!("set_private_key_file failed: {e}")))?;
    builder
        .check_private_key()
        .map_err(|e| DtlsError::Ssl(format!("private key does not match certificate: {e}")))?;

    if let Some(fp) = expected_fingerprint {
        let logger_cb = logger.clone();
        // WebRTC trust comes from the SDP fingerprint, not a CA chain.
        builder.set_verify_callback(
            SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
            move |_preverify_ok, ctx| {
                let Some(cert) = ctx.current_cert() else {
                    sink_warn!(logger_cb, "[DTLS] verify: no certificate presented by peer");
                    return false;
                };
                let Ok(digest) = cert.digest(MessageDigest::sha256()) else {
                    sink_warn!(logger_cb, "[DTLS] verify: failed to compute peer digest");
                    return false;
                };
                let computed = colon_hex(&digest);
                if computed.eq_ignore_ascii_case(&fp) {
                    true
                } else {
                    sink_warn!(
                        logger_cb,
                        "[DTLS] verify: fingerprint mismatch, expected {} got {}",
                        fp,
                        computed
                    );
                    false
                }
            },
        );
    } else {
        sink_debug!(
            &logger,
            "[DTLS] no peer fingerprint in answer, verification disabled"
        );
        builder.set_verify(SslVerifyMode::NONE);
    }

    Ok(builder)
}

fn handshake_error_to_dtlserr<E: std::fmt::Debug>(he: HandshakeError<E>) -> DtlsError {
    match he {
        HandshakeError::WouldBlock(_) => DtlsError::Handshake("handshake would block".into()),
        HandshakeError::Failure(s) => DtlsError::Handshake(format!("{:?}", s.into_error())),
        HandshakeError::SetupFailure(e) => DtlsError::Ssl(format!("{e:?}")),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn colon_hex_formats_pairs() {
        assert_eq!(colon_hex(&[0xAB, 0x01, 0xFF]), "AB:01:FF");
        assert_eq!(colon_hex(&[]), "");
    }
}
