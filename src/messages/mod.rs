//! M3UA messages (RFC 4666)
//!
//! A message is the fixed 8-octet common header followed by a flat sequence
//! of TLV parameters. The `(class, type)` pair selects the variant; unknown
//! combinations decode into [`Message::Generic`] preserving the raw
//! parameter list.

pub mod params;

use crate::errors::CodecError;
use crate::types::TrafficModeType;
use bytes::{BufMut, Bytes, BytesMut};

pub use params::{Param, ProtocolData};

/// Protocol version carried in the common header.
pub const M3UA_VERSION: u8 = 1;

// Message Class definitions.
pub const CLASS_MANAGEMENT: u8 = 0;
pub const CLASS_TRANSFER: u8 = 1;
pub const CLASS_SSNM: u8 = 2;
pub const CLASS_ASPSM: u8 = 3;
pub const CLASS_ASPTM: u8 = 4;
pub const CLASS_RKM: u8 = 9;

// Message Type definitions (Management).
pub const TYPE_ERROR: u8 = 0;
pub const TYPE_NOTIFY: u8 = 1;

// Message Type definitions (Transfer).
pub const TYPE_PAYLOAD_DATA: u8 = 1;

// Message Type definitions (SSNM).
pub const TYPE_DUNA: u8 = 1;
pub const TYPE_DAVA: u8 = 2;
pub const TYPE_DAUD: u8 = 3;
pub const TYPE_SCON: u8 = 4;
pub const TYPE_DUPU: u8 = 5;
pub const TYPE_DRST: u8 = 6;

// Message Type definitions (ASPSM).
pub const TYPE_ASP_UP: u8 = 1;
pub const TYPE_ASP_DOWN: u8 = 2;
pub const TYPE_HEARTBEAT: u8 = 3;
pub const TYPE_ASP_UP_ACK: u8 = 4;
pub const TYPE_ASP_DOWN_ACK: u8 = 5;
pub const TYPE_HEARTBEAT_ACK: u8 = 6;

// Message Type definitions (ASPTM).
pub const TYPE_ASP_ACTIVE: u8 = 1;
pub const TYPE_ASP_INACTIVE: u8 = 2;
pub const TYPE_ASP_ACTIVE_ACK: u8 = 3;
pub const TYPE_ASP_INACTIVE_ACK: u8 = 4;

// Message Type definitions (RKM).
pub const TYPE_REG_REQ: u8 = 1;
pub const TYPE_REG_RSP: u8 = 2;
pub const TYPE_DEREG_REQ: u8 = 3;
pub const TYPE_DEREG_RSP: u8 = 4;

/// A decoded M3UA message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // ASP State Maintenance (ASPSM)
    AspUp {
        asp_identifier: Option<u32>,
        info_string: Option<String>,
    },
    AspUpAck {
        asp_identifier: Option<u32>,
        info_string: Option<String>,
    },
    AspDown {
        info_string: Option<String>,
    },
    AspDownAck {
        info_string: Option<String>,
    },
    Heartbeat {
        data: Bytes,
    },
    HeartbeatAck {
        data: Bytes,
    },

    // ASP Traffic Maintenance (ASPTM)
    AspActive {
        traffic_mode_type: Option<TrafficModeType>,
        routing_contexts: Option<Vec<u32>>,
        info_string: Option<String>,
    },
    AspActiveAck {
        traffic_mode_type: Option<TrafficModeType>,
        routing_contexts: Option<Vec<u32>>,
        info_string: Option<String>,
    },
    AspInactive {
        routing_contexts: Option<Vec<u32>>,
        info_string: Option<String>,
    },
    AspInactiveAck {
        routing_contexts: Option<Vec<u32>>,
        info_string: Option<String>,
    },

    // Transfer
    Data {
        network_appearance: Option<u32>,
        routing_contexts: Option<Vec<u32>>,
        protocol_data: ProtocolData,
        correlation_id: Option<u32>,
    },

    // Management
    Error {
        code: u32,
        routing_contexts: Option<Vec<u32>>,
        network_appearance: Option<u32>,
        affected_point_codes: Option<Vec<u32>>,
        diagnostic: Option<Bytes>,
    },
    Notify {
        status_type: u16,
        status_info: u16,
        asp_identifier: Option<u32>,
        routing_contexts: Option<Vec<u32>>,
        info_string: Option<String>,
    },

    // Signalling Network Management (SSNM); decode-only for this endpoint.
    Duna {
        network_appearance: Option<u32>,
        routing_contexts: Option<Vec<u32>>,
        affected_point_codes: Vec<u32>,
        info_string: Option<String>,
    },
    Dava {
        network_appearance: Option<u32>,
        routing_contexts: Option<Vec<u32>>,
        affected_point_codes: Vec<u32>,
        info_string: Option<String>,
    },
    Daud {
        network_appearance: Option<u32>,
        routing_contexts: Option<Vec<u32>>,
        affected_point_codes: Vec<u32>,
        info_string: Option<String>,
    },
    Scon {
        network_appearance: Option<u32>,
        routing_contexts: Option<Vec<u32>>,
        affected_point_codes: Vec<u32>,
        concerned_destination: Option<u32>,
        congestion_indications: Option<u32>,
        info_string: Option<String>,
    },
    Dupu {
        network_appearance: Option<u32>,
        routing_contexts: Option<Vec<u32>>,
        affected_point_codes: Vec<u32>,
        cause: u16,
        user: u16,
        info_string: Option<String>,
    },
    Drst {
        network_appearance: Option<u32>,
        routing_contexts: Option<Vec<u32>>,
        affected_point_codes: Vec<u32>,
        info_string: Option<String>,
    },

    // Routing Key Management (RKM); parameter-list passthrough.
    RegReq {
        params: Vec<Param>,
    },
    RegRsp {
        params: Vec<Param>,
    },
    DeregReq {
        params: Vec<Param>,
    },
    DeregRsp {
        params: Vec<Param>,
    },

    /// Unknown (class, type) combination; raw parameters preserved.
    Generic {
        class: u8,
        mtype: u8,
        params: Vec<Param>,
    },
}

fn combine(class: u8, mtype: u8) -> u16 {
    ((class as u16) << 4) | mtype as u16
}

impl Message {
    pub fn class(&self) -> u8 {
        match self {
            Self::Error { .. } | Self::Notify { .. } => CLASS_MANAGEMENT,
            Self::Data { .. } => CLASS_TRANSFER,
            Self::Duna { .. }
            | Self::Dava { .. }
            | Self::Daud { .. }
            | Self::Scon { .. }
            | Self::Dupu { .. }
            | Self::Drst { .. } => CLASS_SSNM,
            Self::AspUp { .. }
            | Self::AspUpAck { .. }
            | Self::AspDown { .. }
            | Self::AspDownAck { .. }
            | Self::Heartbeat { .. }
            | Self::HeartbeatAck { .. } => CLASS_ASPSM,
            Self::AspActive { .. }
            | Self::AspActiveAck { .. }
            | Self::AspInactive { .. }
            | Self::AspInactiveAck { .. } => CLASS_ASPTM,
            Self::RegReq { .. }
            | Self::RegRsp { .. }
            | Self::DeregReq { .. }
            | Self::DeregRsp { .. } => CLASS_RKM,
            Self::Generic { class, .. } => *class,
        }
    }

    pub fn message_type(&self) -> u8 {
        match self {
            Self::Error { .. } => TYPE_ERROR,
            Self::Notify { .. } => TYPE_NOTIFY,
            Self::Data { .. } => TYPE_PAYLOAD_DATA,
            Self::Duna { .. } => TYPE_DUNA,
            Self::Dava { .. } => TYPE_DAVA,
            Self::Daud { .. } => TYPE_DAUD,
            Self::Scon { .. } => TYPE_SCON,
            Self::Dupu { .. } => TYPE_DUPU,
            Self::Drst { .. } => TYPE_DRST,
            Self::AspUp { .. } => TYPE_ASP_UP,
            Self::AspDown { .. } => TYPE_ASP_DOWN,
            Self::Heartbeat { .. } => TYPE_HEARTBEAT,
            Self::AspUpAck { .. } => TYPE_ASP_UP_ACK,
            Self::AspDownAck { .. } => TYPE_ASP_DOWN_ACK,
            Self::HeartbeatAck { .. } => TYPE_HEARTBEAT_ACK,
            Self::AspActive { .. } => TYPE_ASP_ACTIVE,
            Self::AspInactive { .. } => TYPE_ASP_INACTIVE,
            Self::AspActiveAck { .. } => TYPE_ASP_ACTIVE_ACK,
            Self::AspInactiveAck { .. } => TYPE_ASP_INACTIVE_ACK,
            Self::RegReq { .. } => TYPE_REG_REQ,
            Self::RegRsp { .. } => TYPE_REG_RSP,
            Self::DeregReq { .. } => TYPE_DEREG_REQ,
            Self::DeregRsp { .. } => TYPE_DEREG_RSP,
            Self::Generic { mtype, .. } => *mtype,
        }
    }

    pub fn class_name(&self) -> &'static str {
        class_name(self.class())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Error { .. } => "Error",
            Self::Notify { .. } => "Notify",
            Self::Data { .. } => "Payload Data",
            Self::Duna { .. } => "Destination Unavailable",
            Self::Dava { .. } => "Destination Available",
            Self::Daud { .. } => "Destination State Audit",
            Self::Scon { .. } => "Signalling Congestion",
            Self::Dupu { .. } => "Destination User Part Unavailable",
            Self::Drst { .. } => "Destination Restricted",
            Self::AspUp { .. } => "ASP Up",
            Self::AspDown { .. } => "ASP Down",
            Self::Heartbeat { .. } => "Heartbeat",
            Self::AspUpAck { .. } => "ASP Up Ack",
            Self::AspDownAck { .. } => "ASP Down Ack",
            Self::HeartbeatAck { .. } => "Heartbeat Ack",
            Self::AspActive { .. } => "ASP Active",
            Self::AspInactive { .. } => "ASP Inactive",
            Self::AspActiveAck { .. } => "ASP Active Ack",
            Self::AspInactiveAck { .. } => "ASP Inactive Ack",
            Self::RegReq { .. } => "Registration Request",
            Self::RegRsp { .. } => "Registration Response",
            Self::DeregReq { .. } => "Deregistration Request",
            Self::DeregRsp { .. } => "Deregistration Response",
            Self::Generic { .. } => "Generic",
        }
    }

    /// Parameter list in emission order.
    pub fn params(&self) -> Vec<Param> {
        let mut ps = Vec::new();
        match self {
            Self::AspUp {
                asp_identifier,
                info_string,
            }
            | Self::AspUpAck {
                asp_identifier,
                info_string,
            } => {
                if let Some(id) = asp_identifier {
                    ps.push(Param::AspIdentifier(*id));
                }
                push_info(&mut ps, info_string);
            }
            Self::AspDown { info_string } | Self::AspDownAck { info_string } => {
                push_info(&mut ps, info_string);
            }
            Self::Heartbeat { data } | Self::HeartbeatAck { data } => {
                ps.push(Param::HeartbeatData(data.clone()));
            }
            Self::AspActive {
                traffic_mode_type,
                routing_contexts,
                info_string,
            }
            | Self::AspActiveAck {
                traffic_mode_type,
                routing_contexts,
                info_string,
            } => {
                if let Some(t) = traffic_mode_type {
                    ps.push(Param::TrafficModeType(*t));
                }
                push_rc(&mut ps, routing_contexts);
                push_info(&mut ps, info_string);
            }
            Self::AspInactive {
                routing_contexts,
                info_string,
            }
            | Self::AspInactiveAck {
                routing_contexts,
                info_string,
            } => {
                push_rc(&mut ps, routing_contexts);
                push_info(&mut ps, info_string);
            }
            Self::Data {
                network_appearance,
                routing_contexts,
                protocol_data,
                correlation_id,
            } => {
                push_na(&mut ps, network_appearance);
                push_rc(&mut ps, routing_contexts);
                ps.push(Param::ProtocolData(protocol_data.clone()));
                if let Some(id) = correlation_id {
                    ps.push(Param::CorrelationId(*id));
                }
            }
            Self::Error {
                code,
                routing_contexts,
                network_appearance,
                affected_point_codes,
                diagnostic,
            } => {
                ps.push(Param::ErrorCode(*code));
                push_rc(&mut ps, routing_contexts);
                push_na(&mut ps, network_appearance);
                if let Some(apc) = affected_point_codes {
                    ps.push(Param::AffectedPointCode(apc.clone()));
                }
                if let Some(d) = diagnostic {
                    ps.push(Param::DiagnosticInformation(d.clone()));
                }
            }
            Self::Notify {
                status_type,
                status_info,
                asp_identifier,
                routing_contexts,
                info_string,
            } => {
                ps.push(Param::Status {
                    status_type: *status_type,
                    status_info: *status_info,
                });
                if let Some(id) = asp_identifier {
                    ps.push(Param::AspIdentifier(*id));
                }
                push_rc(&mut ps, routing_contexts);
                push_info(&mut ps, info_string);
            }
            Self::Duna {
                network_appearance,
                routing_contexts,
                affected_point_codes,
                info_string,
            }
            | Self::Dava {
                network_appearance,
                routing_contexts,
                affected_point_codes,
                info_string,
            }
            | Self::Daud {
                network_appearance,
                routing_contexts,
                affected_point_codes,
                info_string,
            }
            | Self::Drst {
                network_appearance,
                routing_contexts,
                affected_point_codes,
                info_string,
            } => {
                push_na(&mut ps, network_appearance);
                push_rc(&mut ps, routing_contexts);
                ps.push(Param::AffectedPointCode(affected_point_codes.clone()));
                push_info(&mut ps, info_string);
            }
            Self::Scon {
                network_appearance,
                routing_contexts,
                affected_point_codes,
                concerned_destination,
                congestion_indications,
                info_string,
            } => {
                push_na(&mut ps, network_appearance);
                push_rc(&mut ps, routing_contexts);
                ps.push(Param::AffectedPointCode(affected_point_codes.clone()));
                if let Some(cd) = concerned_destination {
                    ps.push(Param::ConcernedDestination(*cd));
                }
                if let Some(ci) = congestion_indications {
                    ps.push(Param::CongestionIndications(*ci));
                }
                push_info(&mut ps, info_string);
            }
            Self::Dupu {
                network_appearance,
                routing_contexts,
                affected_point_codes,
                cause,
                user,
                info_string,
            } => {
                push_na(&mut ps, network_appearance);
                push_rc(&mut ps, routing_contexts);
                ps.push(Param::AffectedPointCode(affected_point_codes.clone()));
                ps.push(Param::UserCause {
                    cause: *cause,
                    user: *user,
                });
                push_info(&mut ps, info_string);
            }
            Self::RegReq { params }
            | Self::RegRsp { params }
            | Self::DeregReq { params }
            | Self::DeregRsp { params }
            | Self::Generic { params, .. } => {
                ps.extend(params.iter().cloned());
            }
        }
        ps
    }

    /// Total encoded length: header, parameters and padding.
    pub fn encoded_len(&self) -> usize {
        8 + self
            .params()
            .iter()
            .map(Param::encoded_len)
            .sum::<usize>()
    }

    /// Self-allocating encode. The header Length field always equals the
    /// returned buffer's length.
    pub fn encode(&self) -> Bytes {
        let len = self.encoded_len();
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u8(M3UA_VERSION);
        buf.put_u8(0); // reserved
        buf.put_u8(self.class());
        buf.put_u8(self.message_type());
        buf.put_u32(len as u32);
        params::encode_params(&self.params(), &mut buf);
        buf.freeze()
    }

    /// Encode into a caller-supplied buffer; returns the number of octets
    /// written.
    pub fn encode_to(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(CodecError::EncodeBufferShort);
        }
        let encoded = self.encode();
        buf[..len].copy_from_slice(&encoded);
        Ok(len)
    }

    /// Decode one message from the given octets.
    pub fn decode(b: &[u8]) -> Result<Self, CodecError> {
        if b.len() < 8 {
            return Err(CodecError::DecodeShort);
        }
        let version = b[0];
        if version != M3UA_VERSION {
            return Err(CodecError::InvalidVersion(version));
        }
        let class = b[2];
        let mtype = b[3];
        let length = u32::from_be_bytes([b[4], b[5], b[6], b[7]]) as usize;
        if length < 8 {
            return Err(CodecError::InvalidLength(length));
        }
        if b.len() < length {
            return Err(CodecError::DecodeShort);
        }
        let body = &b[8..length];

        match combine(class, mtype) {
            t if t == combine(CLASS_ASPSM, TYPE_ASP_UP) => decode_asp_up(body, false),
            t if t == combine(CLASS_ASPSM, TYPE_ASP_UP_ACK) => decode_asp_up(body, true),
            t if t == combine(CLASS_ASPSM, TYPE_ASP_DOWN) => decode_asp_down(body, false),
            t if t == combine(CLASS_ASPSM, TYPE_ASP_DOWN_ACK) => decode_asp_down(body, true),
            t if t == combine(CLASS_ASPSM, TYPE_HEARTBEAT) => decode_heartbeat(body, false),
            t if t == combine(CLASS_ASPSM, TYPE_HEARTBEAT_ACK) => decode_heartbeat(body, true),
            t if t == combine(CLASS_ASPTM, TYPE_ASP_ACTIVE) => decode_asp_active(body, false),
            t if t == combine(CLASS_ASPTM, TYPE_ASP_ACTIVE_ACK) => decode_asp_active(body, true),
            t if t == combine(CLASS_ASPTM, TYPE_ASP_INACTIVE) => decode_asp_inactive(body, false),
            t if t == combine(CLASS_ASPTM, TYPE_ASP_INACTIVE_ACK) => {
                decode_asp_inactive(body, true)
            }
            t if t == combine(CLASS_TRANSFER, TYPE_PAYLOAD_DATA) => decode_data(body),
            t if t == combine(CLASS_MANAGEMENT, TYPE_ERROR) => decode_error(body),
            t if t == combine(CLASS_MANAGEMENT, TYPE_NOTIFY) => decode_notify(body),
            t if t == combine(CLASS_SSNM, TYPE_DUNA) => decode_ssnm(body, TYPE_DUNA),
            t if t == combine(CLASS_SSNM, TYPE_DAVA) => decode_ssnm(body, TYPE_DAVA),
            t if t == combine(CLASS_SSNM, TYPE_DAUD) => decode_ssnm(body, TYPE_DAUD),
            t if t == combine(CLASS_SSNM, TYPE_SCON) => decode_scon(body),
            t if t == combine(CLASS_SSNM, TYPE_DUPU) => decode_dupu(body),
            t if t == combine(CLASS_SSNM, TYPE_DRST) => decode_ssnm(body, TYPE_DRST),
            t if t == combine(CLASS_RKM, TYPE_REG_REQ) => Ok(Self::RegReq {
                params: params::decode_params_raw(body)?,
            }),
            t if t == combine(CLASS_RKM, TYPE_REG_RSP) => Ok(Self::RegRsp {
                params: params::decode_params_raw(body)?,
            }),
            t if t == combine(CLASS_RKM, TYPE_DEREG_REQ) => Ok(Self::DeregReq {
                params: params::decode_params_raw(body)?,
            }),
            t if t == combine(CLASS_RKM, TYPE_DEREG_RSP) => Ok(Self::DeregRsp {
                params: params::decode_params_raw(body)?,
            }),
            _ => Ok(Self::Generic {
                class,
                mtype,
                params: params::decode_params_raw(body)?,
            }),
        }
    }
}

pub fn class_name(class: u8) -> &'static str {
    match class {
        CLASS_MANAGEMENT => "Management",
        CLASS_TRANSFER => "Transfer",
        CLASS_SSNM => "SSNM",
        CLASS_ASPSM => "ASPSM",
        CLASS_ASPTM => "ASPTM",
        CLASS_RKM => "RKM",
        _ => "Unknown",
    }
}

/// Whether the class value is one this endpoint knows at all.
pub fn is_known_class(class: u8) -> bool {
    matches!(
        class,
        CLASS_MANAGEMENT | CLASS_TRANSFER | CLASS_SSNM | CLASS_ASPSM | CLASS_ASPTM | CLASS_RKM
    )
}

fn push_info(ps: &mut Vec<Param>, info: &Option<String>) {
    if let Some(s) = info {
        ps.push(Param::InfoString(s.clone()));
    }
}

fn push_rc(ps: &mut Vec<Param>, rc: &Option<Vec<u32>>) {
    if let Some(v) = rc {
        ps.push(Param::RoutingContext(v.clone()));
    }
}

fn push_na(ps: &mut Vec<Param>, na: &Option<u32>) {
    if let Some(v) = na {
        ps.push(Param::NetworkAppearance(*v));
    }
}

fn decode_asp_up(body: &[u8], ack: bool) -> Result<Message, CodecError> {
    let mut asp_identifier = None;
    let mut info_string = None;
    for p in params::decode_params(body)? {
        match p {
            Param::AspIdentifier(id) => asp_identifier = Some(id),
            Param::InfoString(s) => info_string = Some(s),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    Ok(if ack {
        Message::AspUpAck {
            asp_identifier,
            info_string,
        }
    } else {
        Message::AspUp {
            asp_identifier,
            info_string,
        }
    })
}

fn decode_asp_down(body: &[u8], ack: bool) -> Result<Message, CodecError> {
    let mut info_string = None;
    for p in params::decode_params(body)? {
        match p {
            Param::InfoString(s) => info_string = Some(s),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    Ok(if ack {
        Message::AspDownAck { info_string }
    } else {
        Message::AspDown { info_string }
    })
}

fn decode_heartbeat(body: &[u8], ack: bool) -> Result<Message, CodecError> {
    let mut data = None;
    for p in params::decode_params(body)? {
        match p {
            Param::HeartbeatData(d) => data = Some(d),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    let data = data.unwrap_or_default();
    Ok(if ack {
        Message::HeartbeatAck { data }
    } else {
        Message::Heartbeat { data }
    })
}

fn decode_asp_active(body: &[u8], ack: bool) -> Result<Message, CodecError> {
    let mut traffic_mode_type = None;
    let mut routing_contexts = None;
    let mut info_string = None;
    for p in params::decode_params(body)? {
        match p {
            Param::TrafficModeType(t) => traffic_mode_type = Some(t),
            Param::RoutingContext(rc) => routing_contexts = Some(rc),
            Param::InfoString(s) => info_string = Some(s),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    Ok(if ack {
        Message::AspActiveAck {
            traffic_mode_type,
            routing_contexts,
            info_string,
        }
    } else {
        Message::AspActive {
            traffic_mode_type,
            routing_contexts,
            info_string,
        }
    })
}

fn decode_asp_inactive(body: &[u8], ack: bool) -> Result<Message, CodecError> {
    let mut routing_contexts = None;
    let mut info_string = None;
    for p in params::decode_params(body)? {
        match p {
            Param::RoutingContext(rc) => routing_contexts = Some(rc),
            Param::InfoString(s) => info_string = Some(s),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    Ok(if ack {
        Message::AspInactiveAck {
            routing_contexts,
            info_string,
        }
    } else {
        Message::AspInactive {
            routing_contexts,
            info_string,
        }
    })
}

fn decode_data(body: &[u8]) -> Result<Message, CodecError> {
    let mut network_appearance = None;
    let mut routing_contexts = None;
    let mut protocol_data = None;
    let mut correlation_id = None;
    for p in params::decode_params(body)? {
        match p {
            Param::NetworkAppearance(na) => network_appearance = Some(na),
            Param::RoutingContext(rc) => routing_contexts = Some(rc),
            Param::ProtocolData(pd) => protocol_data = Some(pd),
            Param::CorrelationId(id) => correlation_id = Some(id),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    Ok(Message::Data {
        network_appearance,
        routing_contexts,
        protocol_data: protocol_data
            .ok_or(CodecError::MissingParameter(params::PROTOCOL_DATA))?,
        correlation_id,
    })
}

fn decode_error(body: &[u8]) -> Result<Message, CodecError> {
    let mut code = None;
    let mut routing_contexts = None;
    let mut network_appearance = None;
    let mut affected_point_codes = None;
    let mut diagnostic = None;
    for p in params::decode_params(body)? {
        match p {
            Param::ErrorCode(c) => code = Some(c),
            Param::RoutingContext(rc) => routing_contexts = Some(rc),
            Param::NetworkAppearance(na) => network_appearance = Some(na),
            Param::AffectedPointCode(apc) => affected_point_codes = Some(apc),
            Param::DiagnosticInformation(d) => diagnostic = Some(d),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    Ok(Message::Error {
        code: code.ok_or(CodecError::MissingParameter(params::ERROR_CODE))?,
        routing_contexts,
        network_appearance,
        affected_point_codes,
        diagnostic,
    })
}

fn decode_notify(body: &[u8]) -> Result<Message, CodecError> {
    let mut status = None;
    let mut asp_identifier = None;
    let mut routing_contexts = None;
    let mut info_string = None;
    for p in params::decode_params(body)? {
        match p {
            Param::Status {
                status_type,
                status_info,
            } => status = Some((status_type, status_info)),
            Param::AspIdentifier(id) => asp_identifier = Some(id),
            Param::RoutingContext(rc) => routing_contexts = Some(rc),
            Param::InfoString(s) => info_string = Some(s),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    let (status_type, status_info) =
        status.ok_or(CodecError::MissingParameter(params::STATUS))?;
    Ok(Message::Notify {
        status_type,
        status_info,
        asp_identifier,
        routing_contexts,
        info_string,
    })
}

fn decode_ssnm(body: &[u8], mtype: u8) -> Result<Message, CodecError> {
    let mut network_appearance = None;
    let mut routing_contexts = None;
    let mut affected_point_codes = None;
    let mut info_string = None;
    for p in params::decode_params(body)? {
        match p {
            Param::NetworkAppearance(na) => network_appearance = Some(na),
            Param::RoutingContext(rc) => routing_contexts = Some(rc),
            Param::AffectedPointCode(apc) => affected_point_codes = Some(apc),
            Param::InfoString(s) => info_string = Some(s),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    let affected_point_codes = affected_point_codes
        .ok_or(CodecError::MissingParameter(params::AFFECTED_POINT_CODE))?;
    Ok(match mtype {
        TYPE_DUNA => Message::Duna {
            network_appearance,
            routing_contexts,
            affected_point_codes,
            info_string,
        },
        TYPE_DAVA => Message::Dava {
            network_appearance,
            routing_contexts,
            affected_point_codes,
            info_string,
        },
        TYPE_DAUD => Message::Daud {
            network_appearance,
            routing_contexts,
            affected_point_codes,
            info_string,
        },
        _ => Message::Drst {
            network_appearance,
            routing_contexts,
            affected_point_codes,
            info_string,
        },
    })
}

fn decode_scon(body: &[u8]) -> Result<Message, CodecError> {
    let mut network_appearance = None;
    let mut routing_contexts = None;
    let mut affected_point_codes = None;
    let mut concerned_destination = None;
    let mut congestion_indications = None;
    let mut info_string = None;
    for p in params::decode_params(body)? {
        match p {
            Param::NetworkAppearance(na) => network_appearance = Some(na),
            Param::RoutingContext(rc) => routing_contexts = Some(rc),
            Param::AffectedPointCode(apc) => affected_point_codes = Some(apc),
            Param::ConcernedDestination(cd) => concerned_destination = Some(cd),
            Param::CongestionIndications(ci) => congestion_indications = Some(ci),
            Param::InfoString(s) => info_string = Some(s),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    Ok(Message::Scon {
        network_appearance,
        routing_contexts,
        affected_point_codes: affected_point_codes
            .ok_or(CodecError::MissingParameter(params::AFFECTED_POINT_CODE))?,
        concerned_destination,
        congestion_indications,
        info_string,
    })
}

fn decode_dupu(body: &[u8]) -> Result<Message, CodecError> {
    let mut network_appearance = None;
    let mut routing_contexts = None;
    let mut affected_point_codes = None;
    let mut user_cause = None;
    let mut info_string = None;
    for p in params::decode_params(body)? {
        match p {
            Param::NetworkAppearance(na) => network_appearance = Some(na),
            Param::RoutingContext(rc) => routing_contexts = Some(rc),
            Param::AffectedPointCode(apc) => affected_point_codes = Some(apc),
            Param::UserCause { cause, user } => user_cause = Some((cause, user)),
            Param::InfoString(s) => info_string = Some(s),
            other => return Err(CodecError::InvalidParameter(other.tag())),
        }
    }
    let (cause, user) = user_cause.ok_or(CodecError::MissingParameter(params::USER_CAUSE))?;
    Ok(Message::Dupu {
        network_appearance,
        routing_contexts,
        affected_point_codes: affected_point_codes
            .ok_or(CodecError::MissingParameter(params::AFFECTED_POINT_CODE))?,
        cause,
        user,
        info_string,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_wire(msg: Message, wire: &[u8]) {
        let encoded = msg.encode();
        assert_eq!(&encoded[..], wire, "encode mismatch for {:?}", msg);
        assert_eq!(msg.encoded_len(), wire.len());
        let decoded = Message::decode(wire).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_asp_up() {
        assert_wire(
            Message::AspUp {
                asp_identifier: Some(1),
                info_string: None,
            },
            &[
                0x01, 0x00, 0x03, 0x01, 0x00, 0x00, 0x00, 0x10, // header
                0x00, 0x11, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, // AspIdentifier
            ],
        );
    }

    #[test]
    fn test_asp_down_with_info() {
        assert_wire(
            Message::AspDown {
                info_string: Some("deadbeef".to_string()),
            },
            &[
                0x01, 0x00, 0x03, 0x02, 0x00, 0x00, 0x00, 0x14, // header
                0x00, 0x04, 0x00, 0x0c, 0x64, 0x65, 0x61, 0x64, // InfoString
                0x62, 0x65, 0x65, 0x66,
            ],
        );
    }

    #[test]
    fn test_asp_down_ack_bare() {
        assert_wire(
            Message::AspDownAck { info_string: None },
            &[0x01, 0x00, 0x03, 0x05, 0x00, 0x00, 0x00, 0x08],
        );
    }

    #[test]
    fn test_heartbeat() {
        assert_wire(
            Message::Heartbeat {
                data: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
            },
            &[
                0x01, 0x00, 0x03, 0x03, 0x00, 0x00, 0x00, 0x10, // header
                0x00, 0x09, 0x00, 0x08, 0xde, 0xad, 0xbe, 0xef, // HeartbeatData
            ],
        );
    }

    #[test]
    fn test_asp_active() {
        assert_wire(
            Message::AspActive {
                traffic_mode_type: Some(TrafficModeType::Loadshare),
                routing_contexts: Some(vec![1]),
                info_string: None,
            },
            &[
                0x01, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x18, // header
                0x00, 0x0b, 0x00, 0x08, 0x00, 0x00, 0x00, 0x02, // TrafficModeType
                0x00, 0x06, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, // RoutingContext
            ],
        );
    }

    #[test]
    fn test_data() {
        assert_wire(
            Message::Data {
                network_appearance: None,
                routing_contexts: None,
                protocol_data: ProtocolData::new(
                    0x1111_1111,
                    0x2222_2222,
                    3,
                    0,
                    0,
                    1,
                    Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
                ),
                correlation_id: None,
            },
            &[
                0x01, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x1c, // header
                0x02, 0x10, 0x00, 0x14, // ProtocolData TLV
                0x11, 0x11, 0x11, 0x11, 0x22, 0x22, 0x22, 0x22, // OPC, DPC
                0x03, 0x00, 0x00, 0x01, // SI, NI, MP, SLS
                0xde, 0xad, 0xbe, 0xef,
            ],
        );
    }

    #[test]
    fn test_data_requires_protocol_data() {
        // Data with no ProtocolData TLV at all.
        let wire = [0x01, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x08];
        assert_eq!(
            Message::decode(&wire),
            Err(CodecError::MissingParameter(params::PROTOCOL_DATA))
        );
    }

    #[test]
    fn test_error_message() {
        assert_wire(
            Message::Error {
                code: params::ERR_INVALID_STREAM_IDENTIFIER,
                routing_contexts: None,
                network_appearance: None,
                affected_point_codes: None,
                diagnostic: None,
            },
            &[
                0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, // header
                0x00, 0x0c, 0x00, 0x08, 0x00, 0x00, 0x00, 0x09, // ErrorCode
            ],
        );
    }

    #[test]
    fn test_notify() {
        assert_wire(
            Message::Notify {
                status_type: crate::types::STATUS_TYPE_AS_STATE_CHANGE,
                status_info: crate::types::STATUS_INFO_AS_ACTIVE,
                asp_identifier: None,
                routing_contexts: None,
                info_string: None,
            },
            &[
                0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, // header
                0x00, 0x0d, 0x00, 0x08, 0x00, 0x01, 0x00, 0x03, // Status
            ],
        );
    }

    #[test]
    fn test_duna() {
        assert_wire(
            Message::Duna {
                network_appearance: None,
                routing_contexts: None,
                affected_point_codes: vec![0x0000_1234],
                info_string: None,
            },
            &[
                0x01, 0x00, 0x02, 0x01, 0x00, 0x00, 0x00, 0x10, // header
                0x00, 0x12, 0x00, 0x08, 0x00, 0x00, 0x12, 0x34, // AffectedPointCode
            ],
        );
    }

    #[test]
    fn test_dupu_requires_user_cause() {
        // DUPU carrying only an AffectedPointCode.
        let wire = [
            0x01, 0x00, 0x02, 0x05, 0x00, 0x00, 0x00, 0x10, //
            0x00, 0x12, 0x00, 0x08, 0x00, 0x00, 0x12, 0x34,
        ];
        assert_eq!(
            Message::decode(&wire),
            Err(CodecError::MissingParameter(params::USER_CAUSE))
        );
    }

    #[test]
    fn test_generic_round_trip() {
        // Unknown class 5, type 1; must re-encode byte-identically.
        let wire = [
            0x01, 0x00, 0x05, 0x01, 0x00, 0x00, 0x00, 0x10, // header
            0x80, 0x01, 0x00, 0x06, 0xde, 0xad, 0x00, 0x00, // opaque TLV, padded
        ];
        let decoded = Message::decode(&wire).unwrap();
        match &decoded {
            Message::Generic { class, mtype, params } => {
                assert_eq!((*class, *mtype), (5, 1));
                assert_eq!(params.len(), 1);
            }
            other => panic!("expected Generic, got {:?}", other),
        }
        assert_eq!(&decoded.encode()[..], &wire[..]);
    }

    #[test]
    fn test_rkm_passthrough() {
        // RKM Registration Request with an opaque Routing Key parameter.
        let wire = [
            0x01, 0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x14, // header
            0x02, 0x07, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x01, // Routing Key (raw)
            0x00, 0x00, 0x00, 0x02,
        ];
        let decoded = Message::decode(&wire).unwrap();
        assert!(matches!(decoded, Message::RegReq { .. }));
        assert_eq!(&decoded.encode()[..], &wire[..]);
    }

    #[test]
    fn test_invalid_version() {
        let wire = [0x02, 0x00, 0x03, 0x01, 0x00, 0x00, 0x00, 0x08];
        assert_eq!(Message::decode(&wire), Err(CodecError::InvalidVersion(2)));
    }

    #[test]
    fn test_decode_short() {
        assert_eq!(
            Message::decode(&[0x01, 0x00, 0x03]),
            Err(CodecError::DecodeShort)
        );
        // Declared length exceeds what is available.
        let wire = [0x01, 0x00, 0x03, 0x01, 0x00, 0x00, 0x00, 0x10];
        assert_eq!(Message::decode(&wire), Err(CodecError::DecodeShort));
    }

    #[test]
    fn test_invalid_parameter_for_message() {
        // Heartbeat carrying a RoutingContext is not permitted.
        let wire = [
            0x01, 0x00, 0x03, 0x03, 0x00, 0x00, 0x00, 0x10, //
            0x00, 0x06, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01,
        ];
        assert_eq!(
            Message::decode(&wire),
            Err(CodecError::InvalidParameter(params::ROUTING_CONTEXT))
        );
    }

    #[test]
    fn test_encode_to_buffer_short() {
        let msg = Message::AspDown { info_string: None };
        let mut buf = [0u8; 4];
        assert_eq!(msg.encode_to(&mut buf), Err(CodecError::EncodeBufferShort));
        let mut buf = [0u8; 16];
        assert_eq!(msg.encode_to(&mut buf).unwrap(), 8);
        assert_eq!(&buf[..8], &[0x01, 0x00, 0x03, 0x02, 0x00, 0x00, 0x00, 0x08]);
    }

    #[test]
    fn test_encoded_size_is_aligned() {
        let msgs = vec![
            Message::AspUp {
                asp_identifier: None,
                info_string: Some("abc".to_string()),
            },
            Message::Heartbeat {
                data: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7]),
            },
            Message::Data {
                network_appearance: Some(1),
                routing_contexts: Some(vec![9]),
                protocol_data: ProtocolData::sccp(1, 2, 0, Bytes::from_static(&[0xaa])),
                correlation_id: Some(7),
            },
        ];
        for m in msgs {
            let encoded = m.encode();
            assert_eq!(encoded.len() % 4, 0, "{:?}", m);
            let declared = u32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
            assert_eq!(declared as usize, encoded.len(), "{:?}", m);
            assert_eq!(Message::decode(&encoded).unwrap(), m);
        }
    }
}
