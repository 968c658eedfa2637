//! ASP state machine
//!
//! Transitions are pure: [`on_enter`] yields the actions to perform when a
//! state is (re-)entered, [`on_message`] yields the outcome of a received
//! signal. All I/O stays in the association runtime.

use crate::config::Config;
use crate::errors::Error;
use crate::messages::{is_known_class, Message};
use bytes::Bytes;

/// ASP state of the association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspState {
    /// Initial state; also the terminal state after Close.
    Down,
    Inactive,
    Active,
    /// Transport communication-down indication from the peer.
    SctpCdi,
    /// Transport restart indication.
    SctpRi,
}

/// Whether this endpoint initiates (client/ASP) or responds (server/SGP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Actions requested when a state is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryAction {
    SendAspUp,
    SendAspActive,
    /// First entry into Active: fire "established" and release the
    /// heartbeat gate.
    SignalEstablished,
}

/// Entry actions for the given state, or the error that must tear the
/// association down.
pub(crate) fn on_enter(
    role: Role,
    current: AspState,
    previous: AspState,
) -> Result<Vec<EntryAction>, Error> {
    match current {
        AspState::Down => match role {
            Role::Client => Ok(vec![EntryAction::SendAspUp]),
            Role::Server => Ok(vec![]),
        },
        AspState::Inactive => match role {
            Role::Client => Ok(vec![EntryAction::SendAspActive]),
            Role::Server => Ok(vec![]),
        },
        AspState::Active => {
            if previous != AspState::Active {
                Ok(vec![EntryAction::SignalEstablished])
            } else {
                Ok(vec![])
            }
        }
        AspState::SctpCdi | AspState::SctpRi => Err(Error::SctpNotAlive),
    }
}

/// The decided consequences of one received signal.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    /// Signal to send back, on stream 0.
    pub reply: Option<Message>,
    /// State to post; `None` re-posts the current state.
    pub next: Option<AspState>,
    /// Error to surface through the error channel.
    pub error: Option<Error>,
    /// Tear the association down after reply/error are delivered.
    pub close: bool,
    /// Token for the heartbeat ack channel.
    pub beat_ack: bool,
}

impl Outcome {
    fn error(e: Error) -> Self {
        Self {
            error: Some(e),
            ..Self::default()
        }
    }
}

/// Decide how to react to a decoded non-Transfer signal.
///
/// `raw` is the original packet (for diagnostic octets), `last_beat` the
/// most recently sent heartbeat challenge.
pub(crate) fn on_message(
    role: Role,
    state: AspState,
    stream_id: u16,
    msg: &Message,
    raw: &Bytes,
    cfg: &Config,
    last_beat: Option<&Bytes>,
) -> Outcome {
    match msg {
        Message::AspUp { asp_identifier, .. } => {
            if stream_id != 0 {
                return Outcome::error(Error::InvalidSctpStreamId(stream_id));
            }
            if state != AspState::Down {
                // A peer re-sending ASP Up while up is broken; cut it off.
                return Outcome {
                    error: Some(Error::unexpected(msg)),
                    close: true,
                    ..Outcome::default()
                };
            }
            if cfg.require_asp_identifier && asp_identifier.is_none() {
                return Outcome::error(Error::AspIdRequired);
            }
            Outcome {
                reply: Some(Message::AspUpAck {
                    asp_identifier: cfg.asp_identifier,
                    info_string: None,
                }),
                next: Some(AspState::Inactive),
                ..Outcome::default()
            }
        }
        Message::AspUpAck { .. } => {
            if stream_id != 0 {
                return Outcome::error(Error::InvalidSctpStreamId(stream_id));
            }
            if state != AspState::Down {
                return Outcome::error(Error::unexpected(msg));
            }
            Outcome {
                next: Some(AspState::Inactive),
                ..Outcome::default()
            }
        }
        Message::AspDown { .. } => {
            if stream_id != 0 {
                return Outcome::error(Error::InvalidSctpStreamId(stream_id));
            }
            let unexpected = role == Role::Client
                && matches!(state, AspState::Inactive | AspState::Active);
            Outcome {
                reply: Some(Message::AspDownAck { info_string: None }),
                next: Some(AspState::Down),
                error: unexpected.then(|| Error::unexpected(msg)),
                close: state != AspState::Down,
                ..Outcome::default()
            }
        }
        Message::AspDownAck { .. } => {
            if stream_id != 0 {
                return Outcome::error(Error::InvalidSctpStreamId(stream_id));
            }
            match state {
                AspState::Inactive | AspState::Active => Outcome {
                    error: Some(Error::unexpected(msg)),
                    close: role == Role::Client,
                    ..Outcome::default()
                },
                _ => Outcome {
                    next: Some(AspState::Down),
                    ..Outcome::default()
                },
            }
        }
        Message::Heartbeat { data } => {
            if stream_id != 0 {
                return Outcome::error(Error::InvalidSctpStreamId(stream_id));
            }
            if state != AspState::Active {
                return Outcome::error(Error::unexpected(msg));
            }
            // Identical to the Heartbeat apart from the message type.
            Outcome {
                reply: Some(Message::HeartbeatAck { data: data.clone() }),
                ..Outcome::default()
            }
        }
        Message::HeartbeatAck { data } => {
            if stream_id != 0 {
                return Outcome::error(Error::InvalidSctpStreamId(stream_id));
            }
            if state != AspState::Active {
                return Outcome::error(Error::unexpected(msg));
            }
            match last_beat {
                Some(sent) if sent == data => Outcome {
                    beat_ack: true,
                    ..Outcome::default()
                },
                _ => Outcome::error(Error::unexpected(msg)),
            }
        }
        Message::AspActive { .. } => {
            if state != AspState::Inactive {
                return Outcome::error(Error::unexpected(msg));
            }
            Outcome {
                reply: Some(Message::AspActiveAck {
                    traffic_mode_type: cfg.traffic_mode,
                    routing_contexts: cfg.routing_contexts.clone(),
                    info_string: None,
                }),
                next: Some(AspState::Active),
                ..Outcome::default()
            }
        }
        Message::AspActiveAck { .. } => {
            if state != AspState::Inactive {
                return Outcome::error(Error::unexpected(msg));
            }
            Outcome {
                next: Some(AspState::Active),
                ..Outcome::default()
            }
        }
        Message::AspInactive { .. } => {
            if state != AspState::Active {
                return Outcome::error(Error::unexpected(msg));
            }
            Outcome {
                reply: Some(Message::AspInactiveAck {
                    routing_contexts: cfg.routing_contexts.clone(),
                    info_string: None,
                }),
                next: Some(AspState::Inactive),
                ..Outcome::default()
            }
        }
        Message::AspInactiveAck { .. } => {
            if state != AspState::Active {
                return Outcome::error(Error::unexpected(msg));
            }
            Outcome {
                next: Some(AspState::Inactive),
                ..Outcome::default()
            }
        }
        Message::Error { .. } | Message::Notify { .. } => {
            if matches!(state, AspState::SctpCdi | AspState::SctpRi) {
                return Outcome::error(Error::unexpected(msg));
            }
            Outcome::default()
        }
        // SSNM is decode-only; nothing for the state machine to do.
        Message::Duna { .. }
        | Message::Dava { .. }
        | Message::Daud { .. }
        | Message::Scon { .. }
        | Message::Dupu { .. }
        | Message::Drst { .. } => Outcome::default(),
        // RKM is decode-only passthrough; receiving one is unsupported.
        Message::RegReq { .. }
        | Message::RegRsp { .. }
        | Message::DeregReq { .. }
        | Message::DeregRsp { .. } => Outcome::error(Error::UnsupportedMessage {
            class: msg.class(),
            mtype: msg.message_type(),
            raw: raw.clone(),
        }),
        Message::Generic { class, mtype, .. } => {
            if is_known_class(*class) {
                Outcome::error(Error::UnsupportedMessage {
                    class: *class,
                    mtype: *mtype,
                    raw: raw.clone(),
                })
            } else {
                Outcome::error(Error::UnsupportedClass {
                    class: *class,
                    raw: raw.clone(),
                })
            }
        }
        // Transfer data never reaches this function.
        Message::Data { .. } => Outcome::default(),
    }
}
