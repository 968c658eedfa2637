//! Error types for the M3UA endpoint, and the mapping of internal errors
//! onto on-wire Error messages.

use crate::config::Config;
use crate::fsm::AspState;
use crate::messages::{params, Message};
use bytes::Bytes;
use thiserror::Error as ThisError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime errors surfaced by the association.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("SCTP is no longer alive")]
    SctpNotAlive,

    #[error("invalid state: {0:?}")]
    InvalidState(AspState),

    #[error("M3UA connection not established")]
    NotEstablished,

    #[error("failed to establish M3UA connection")]
    FailedToEstablish,

    #[error("timed out")]
    Timeout,

    #[error("heartbeat timer expired")]
    HeartbeatExpired,

    #[error("failed to write signal")]
    FailedToWriteSignal,

    #[error("invalid version: {0}")]
    InvalidVersion(u8),

    #[error("message class unsupported. class: {class}")]
    UnsupportedClass { class: u8, raw: Bytes },

    #[error("message unsupported. class: {class}, type: {mtype}")]
    UnsupportedMessage { class: u8, mtype: u8, raw: Bytes },

    #[error("unexpected message. class: {class}, type: {mtype}")]
    UnexpectedMessage {
        class: &'static str,
        mtype: &'static str,
    },

    #[error("invalid SCTP stream ID: {0}")]
    InvalidSctpStreamId(u16),

    #[error("ASP identifier required")]
    AspIdRequired,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("SCTP error: {0}")]
    Sctp(#[from] SctpError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode/decode failures from the message codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum CodecError {
    #[error("too short to decode as M3UA")]
    DecodeShort,

    #[error("insufficient buffer to encode M3UA into")]
    EncodeBufferShort,

    #[error("invalid length value: {0}")]
    InvalidLength(usize),

    #[error("invalid parameter inside a message: tag {0:#06x}")]
    InvalidParameter(u16),

    #[error("missing required parameter: tag {0:#06x}")]
    MissingParameter(u16),

    #[error("invalid version: {0}")]
    InvalidVersion(u8),
}

/// Transport-layer errors.
#[derive(Debug, ThisError)]
pub enum SctpError {
    #[error("association failed: {0}")]
    AssociationFailed(String),

    #[error("invalid network scheme: {0}")]
    InvalidScheme(String),

    #[error("stream negotiation failed: {0}")]
    Handshake(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("association closed by peer")]
    PeerClosed,

    #[error("association reset by peer")]
    PeerReset,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map this error onto an on-wire Error message, if the protocol calls
    /// for one. Errors with no mapping propagate to the caller unchanged.
    pub(crate) fn to_wire(&self, cfg: &Config) -> Option<Message> {
        match self {
            Self::InvalidVersion(_) => Some(Message::Error {
                code: params::ERR_INVALID_VERSION,
                routing_contexts: None,
                network_appearance: None,
                affected_point_codes: None,
                diagnostic: None,
            }),
            Self::UnsupportedClass { raw, .. } => Some(Message::Error {
                code: params::ERR_UNSUPPORTED_MESSAGE_CLASS,
                routing_contexts: None,
                network_appearance: None,
                affected_point_codes: None,
                diagnostic: Some(first_40_octets(raw)),
            }),
            Self::UnsupportedMessage { raw, .. } => Some(Message::Error {
                code: params::ERR_UNSUPPORTED_MESSAGE_TYPE,
                routing_contexts: None,
                network_appearance: None,
                affected_point_codes: None,
                diagnostic: Some(first_40_octets(raw)),
            }),
            Self::UnexpectedMessage { .. } => Some(Message::Error {
                code: params::ERR_UNEXPECTED_MESSAGE,
                routing_contexts: cfg.routing_contexts.clone(),
                network_appearance: cfg.network_appearance,
                affected_point_codes: Some(vec![cfg.originating_point_code]),
                diagnostic: None,
            }),
            Self::InvalidSctpStreamId(_) => Some(Message::Error {
                code: params::ERR_INVALID_STREAM_IDENTIFIER,
                routing_contexts: None,
                network_appearance: None,
                affected_point_codes: None,
                diagnostic: None,
            }),
            Self::AspIdRequired => Some(Message::Error {
                code: params::ERR_ASP_IDENTIFIER_REQUIRED,
                routing_contexts: None,
                network_appearance: None,
                affected_point_codes: None,
                diagnostic: None,
            }),
            _ => None,
        }
    }

    /// Convenience for building the unexpected-message error from a decoded
    /// message.
    pub(crate) fn unexpected(msg: &Message) -> Self {
        Self::UnexpectedMessage {
            class: msg.class_name(),
            mtype: msg.type_name(),
        }
    }
}

fn first_40_octets(raw: &Bytes) -> Bytes {
    raw.slice(..raw.len().min(40))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut cfg = Config::new(0x1111_1111, 0x2222_2222, 3, 0, 0, 1);
        cfg.routing_contexts = Some(vec![1]);
        cfg.network_appearance = Some(2);
        cfg
    }

    #[test]
    fn test_invalid_version_maps_to_code_1() {
        let wire = Error::InvalidVersion(2).to_wire(&test_config()).unwrap();
        match wire {
            Message::Error {
                code,
                routing_contexts,
                diagnostic,
                ..
            } => {
                assert_eq!(code, params::ERR_INVALID_VERSION);
                assert_eq!(routing_contexts, None);
                assert_eq!(diagnostic, None);
            }
            other => panic!("expected Error message, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_message_carries_first_40_octets() {
        let raw = Bytes::from(vec![0xab; 64]);
        let err = Error::UnsupportedMessage {
            class: 9,
            mtype: 1,
            raw: raw.clone(),
        };
        match err.to_wire(&test_config()).unwrap() {
            Message::Error {
                code, diagnostic, ..
            } => {
                assert_eq!(code, params::ERR_UNSUPPORTED_MESSAGE_TYPE);
                assert_eq!(diagnostic.unwrap(), raw.slice(..40));
            }
            other => panic!("expected Error message, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_message_carries_local_context() {
        let cfg = test_config();
        let err = Error::UnexpectedMessage {
            class: "ASPSM",
            mtype: "ASP Up",
        };
        match err.to_wire(&cfg).unwrap() {
            Message::Error {
                code,
                routing_contexts,
                network_appearance,
                affected_point_codes,
                ..
            } => {
                assert_eq!(code, params::ERR_UNEXPECTED_MESSAGE);
                assert_eq!(routing_contexts, Some(vec![1]));
                assert_eq!(network_appearance, Some(2));
                assert_eq!(affected_point_codes, Some(vec![0x1111_1111]));
            }
            other => panic!("expected Error message, got {:?}", other),
        }
    }

    #[test]
    fn test_unmapped_errors_produce_no_wire_message() {
        let cfg = test_config();
        assert!(Error::HeartbeatExpired.to_wire(&cfg).is_none());
        assert!(Error::NotEstablished.to_wire(&cfg).is_none());
        assert!(Error::SctpNotAlive.to_wire(&cfg).is_none());
    }

    #[test]
    fn test_stream_id_maps_to_code_9() {
        match Error::InvalidSctpStreamId(1).to_wire(&test_config()).unwrap() {
            Message::Error { code, .. } => {
                assert_eq!(code, params::ERR_INVALID_STREAM_IDENTIFIER)
            }
            other => panic!("expected Error message, got {:?}", other),
        }
    }
}
