//! streamedge is the egress core of a live streaming media server.
//!
//! It delivers live media to viewers over two paths:
//! - a per-session WebRTC pipeline (RTP/RTCP over SRTP over DTLS over ICE),
//!   fanned out from each published stream, and
//! - a segment packetizer keeping a rolling window of HLS/DASH segments.
//!
//! The crate is structured into modules along those layers; the publisher
//! module ties them together behind the signalling contract.

/// Time utilities: ticks, wall clock, ISO-8601, NTP, timescale conversion.
pub mod clock;
/// Handles configuration loading and the typed publisher settings.
pub mod config;
/// DTLS-SRTP handshake for the session pipeline.
pub mod dtls;
/// ICE: STUN codec, candidates and the shared media port.
pub mod ice;
/// Logging utilities for the server.
pub mod log;
/// The per-session node pipeline (RtpRtcp, SRTP, DTLS, ICE adapter).
pub mod pipeline;
/// Publisher, applications, streams, sessions and admission checks.
pub mod publisher;
/// RTCP packet parsing, building and sender-report generation.
pub mod rtcp;
/// RTP packet model per RFC 3550.
pub mod rtp;
/// SDP parsing and building for offers and answers.
pub mod sdp;
/// Rolling segment window for HTTP-segment viewers.
pub mod segment;
/// Signalling message contract and listener shell.
pub mod signaling;
/// SRTP/SRTCP protection.
pub mod srtp;
/// Operator statistics log (CSV lines).
pub mod stats;
/// Transcoder boundary queues and notifications.
pub mod transcoder;
