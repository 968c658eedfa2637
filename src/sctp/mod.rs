//! SCTP-style multi-streaming transport for M3UA
//!
//! Provides ordered per-stream delivery with an explicit send-info control
//! block, over TCP for environments without kernel SCTP.

mod association;

pub use association::{SctpAssociation, SctpListener};

use crate::errors::SctpError;

/// SCTP Payload Protocol Identifier for M3UA, network byte order.
pub const PPID_M3UA: u32 = 0x0300_0000;

/// Control chunk types used by the stream-negotiation handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkType {
    Init = 1,
    InitAck = 2,
}

/// Per-send control block. Copied by value for every send; the template
/// held by the association runtime is never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendInfo {
    pub ppid: u32,
    pub stream_id: u16,
}

impl SendInfo {
    pub fn m3ua() -> Self {
        Self {
            ppid: PPID_M3UA,
            stream_id: 0,
        }
    }
}

/// Stream counts proposed to the peer during association setup.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub inbound_streams: u16,
    pub outbound_streams: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            inbound_streams: 2,
            outbound_streams: 2,
        }
    }
}

/// Negotiated association status, queried once right after setup.
#[derive(Debug, Clone, Copy)]
pub struct SctpStatus {
    pub outbound_streams: u16,
    pub inbound_streams: u16,
}

/// Map an M3UA network scheme onto the transport scheme.
pub fn scheme_to_sctp(scheme: &str) -> Result<&'static str, SctpError> {
    match scheme {
        "m3ua" => Ok("sctp"),
        "m3ua4" => Ok("sctp4"),
        "m3ua6" => Ok("sctp6"),
        other => Err(SctpError::InvalidScheme(other.to_string())),
    }
}

/// Whether the address family fits the (already mapped) transport scheme.
pub(crate) fn family_matches(scheme: &str, addr: &std::net::SocketAddr) -> bool {
    match scheme {
        "sctp4" => addr.is_ipv4(),
        "sctp6" => addr.is_ipv6(),
        _ => true,
    }
}
