//! M3UA variable-length parameters (TLV layer)
//!
//! A parameter is Tag (2 octets), Length (2 octets, inclusive of the TLV
//! header, exclusive of trailing padding), Value, then zero padding to a
//! 4-octet boundary.

use crate::errors::CodecError;
use crate::types::TrafficModeType;
use bytes::{Buf, BufMut, Bytes, BytesMut};

// Common parameter tags.
pub const INFO_STRING: u16 = 0x0004;
pub const ROUTING_CONTEXT: u16 = 0x0006;
pub const DIAGNOSTIC_INFORMATION: u16 = 0x0007;
pub const HEARTBEAT_DATA: u16 = 0x0009;
pub const TRAFFIC_MODE_TYPE: u16 = 0x000B;
pub const ERROR_CODE: u16 = 0x000C;
pub const STATUS: u16 = 0x000D;
pub const ASP_IDENTIFIER: u16 = 0x0011;
pub const AFFECTED_POINT_CODE: u16 = 0x0012;
pub const CORRELATION_ID: u16 = 0x0013;

// M3UA-specific parameter tags.
pub const NETWORK_APPEARANCE: u16 = 0x0200;
pub const USER_CAUSE: u16 = 0x0204;
pub const CONGESTION_INDICATIONS: u16 = 0x0205;
pub const CONCERNED_DESTINATION: u16 = 0x0206;
pub const DESTINATION_POINT_CODE: u16 = 0x020B;
pub const PROTOCOL_DATA: u16 = 0x0210;

// Error Code values carried in a Management Error message.
pub const ERR_INVALID_VERSION: u32 = 0x01;
pub const ERR_UNSUPPORTED_MESSAGE_CLASS: u32 = 0x03;
pub const ERR_UNSUPPORTED_MESSAGE_TYPE: u32 = 0x04;
pub const ERR_UNSUPPORTED_TRAFFIC_MODE: u32 = 0x05;
pub const ERR_UNEXPECTED_MESSAGE: u32 = 0x06;
pub const ERR_PROTOCOL_ERROR: u32 = 0x07;
pub const ERR_INVALID_STREAM_IDENTIFIER: u32 = 0x09;
pub const ERR_REFUSED_MANAGEMENT_BLOCKING: u32 = 0x0D;
pub const ERR_ASP_IDENTIFIER_REQUIRED: u32 = 0x0E;
pub const ERR_INVALID_ASP_IDENTIFIER: u32 = 0x0F;
pub const ERR_INVALID_PARAMETER_VALUE: u32 = 0x11;
pub const ERR_PARAMETER_FIELD_ERROR: u32 = 0x12;
pub const ERR_UNEXPECTED_PARAMETER: u32 = 0x13;
pub const ERR_DESTINATION_STATUS_UNKNOWN: u32 = 0x14;
pub const ERR_INVALID_NETWORK_APPEARANCE: u32 = 0x15;
pub const ERR_MISSING_PARAMETER: u32 = 0x16;
pub const ERR_INVALID_ROUTING_CONTEXT: u32 = 0x19;
pub const ERR_NO_CONFIGURED_AS_FOR_ASP: u32 = 0x1A;

/// A single decoded M3UA parameter.
///
/// Known tags decode into typed variants; anything else is preserved in
/// `Opaque` so unknown messages survive a decode/re-encode round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    InfoString(String),
    RoutingContext(Vec<u32>),
    DiagnosticInformation(Bytes),
    HeartbeatData(Bytes),
    TrafficModeType(TrafficModeType),
    ErrorCode(u32),
    Status { status_type: u16, status_info: u16 },
    AspIdentifier(u32),
    AffectedPointCode(Vec<u32>),
    CorrelationId(u32),
    NetworkAppearance(u32),
    UserCause { cause: u16, user: u16 },
    CongestionIndications(u32),
    ConcernedDestination(u32),
    DestinationPointCode(u32),
    ProtocolData(ProtocolData),
    Opaque { tag: u16, value: Bytes },
}

impl Param {
    pub fn tag(&self) -> u16 {
        match self {
            Self::InfoString(_) => INFO_STRING,
            Self::RoutingContext(_) => ROUTING_CONTEXT,
            Self::DiagnosticInformation(_) => DIAGNOSTIC_INFORMATION,
            Self::HeartbeatData(_) => HEARTBEAT_DATA,
            Self::TrafficModeType(_) => TRAFFIC_MODE_TYPE,
            Self::ErrorCode(_) => ERROR_CODE,
            Self::Status { .. } => STATUS,
            Self::AspIdentifier(_) => ASP_IDENTIFIER,
            Self::AffectedPointCode(_) => AFFECTED_POINT_CODE,
            Self::CorrelationId(_) => CORRELATION_ID,
            Self::NetworkAppearance(_) => NETWORK_APPEARANCE,
            Self::UserCause { .. } => USER_CAUSE,
            Self::CongestionIndications(_) => CONGESTION_INDICATIONS,
            Self::ConcernedDestination(_) => CONCERNED_DESTINATION,
            Self::DestinationPointCode(_) => DESTINATION_POINT_CODE,
            Self::ProtocolData(_) => PROTOCOL_DATA,
            Self::Opaque { tag, .. } => *tag,
        }
    }

    /// Length of the value portion, excluding the TLV header and padding.
    pub fn value_len(&self) -> usize {
        match self {
            Self::InfoString(s) => s.len(),
            Self::RoutingContext(v) | Self::AffectedPointCode(v) => v.len() * 4,
            Self::DiagnosticInformation(b) | Self::HeartbeatData(b) => b.len(),
            Self::TrafficModeType(_)
            | Self::ErrorCode(_)
            | Self::Status { .. }
            | Self::AspIdentifier(_)
            | Self::CorrelationId(_)
            | Self::NetworkAppearance(_)
            | Self::UserCause { .. }
            | Self::CongestionIndications(_)
            | Self::ConcernedDestination(_)
            | Self::DestinationPointCode(_) => 4,
            Self::ProtocolData(pd) => pd.encoded_len(),
            Self::Opaque { value, .. } => value.len(),
        }
    }

    /// Full on-wire length: TLV header, value and alignment padding.
    pub fn encoded_len(&self) -> usize {
        let vlen = self.value_len();
        4 + vlen + padding(vlen)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let vlen = self.value_len();
        buf.put_u16(self.tag());
        buf.put_u16((4 + vlen) as u16);
        match self {
            Self::InfoString(s) => buf.put_slice(s.as_bytes()),
            Self::RoutingContext(v) | Self::AffectedPointCode(v) => {
                for u in v {
                    buf.put_u32(*u);
                }
            }
            Self::DiagnosticInformation(b) | Self::HeartbeatData(b) => buf.put_slice(b),
            Self::TrafficModeType(t) => buf.put_u32(t.value()),
            Self::ErrorCode(u)
            | Self::AspIdentifier(u)
            | Self::CorrelationId(u)
            | Self::NetworkAppearance(u)
            | Self::CongestionIndications(u)
            | Self::ConcernedDestination(u)
            | Self::DestinationPointCode(u) => buf.put_u32(*u),
            Self::Status { status_type, status_info } => {
                buf.put_u16(*status_type);
                buf.put_u16(*status_info);
            }
            Self::UserCause { cause, user } => {
                buf.put_u16(*cause);
                buf.put_u16(*user);
            }
            Self::ProtocolData(pd) => pd.encode(buf),
            Self::Opaque { value, .. } => buf.put_slice(value),
        }
        for _ in 0..padding(vlen) {
            buf.put_u8(0);
        }
    }

    /// Decode a single parameter value for a known tag; unknown tags are
    /// preserved as `Opaque`.
    pub fn decode(tag: u16, value: &[u8]) -> Result<Self, CodecError> {
        match tag {
            INFO_STRING => String::from_utf8(value.to_vec())
                .map(Self::InfoString)
                .map_err(|_| CodecError::InvalidParameter(tag)),
            ROUTING_CONTEXT => Ok(Self::RoutingContext(decode_u32s(value)?)),
            DIAGNOSTIC_INFORMATION => {
                Ok(Self::DiagnosticInformation(Bytes::copy_from_slice(value)))
            }
            HEARTBEAT_DATA => Ok(Self::HeartbeatData(Bytes::copy_from_slice(value))),
            TRAFFIC_MODE_TYPE => {
                let v = decode_u32(value)?;
                TrafficModeType::from_u32(v)
                    .map(Self::TrafficModeType)
                    .ok_or(CodecError::InvalidParameter(tag))
            }
            ERROR_CODE => Ok(Self::ErrorCode(decode_u32(value)?)),
            STATUS => {
                let v = decode_u32(value)?;
                Ok(Self::Status {
                    status_type: (v >> 16) as u16,
                    status_info: v as u16,
                })
            }
            ASP_IDENTIFIER => Ok(Self::AspIdentifier(decode_u32(value)?)),
            AFFECTED_POINT_CODE => Ok(Self::AffectedPointCode(decode_u32s(value)?)),
            CORRELATION_ID => Ok(Self::CorrelationId(decode_u32(value)?)),
            NETWORK_APPEARANCE => Ok(Self::NetworkAppearance(decode_u32(value)?)),
            USER_CAUSE => {
                let v = decode_u32(value)?;
                Ok(Self::UserCause {
                    cause: (v >> 16) as u16,
                    user: v as u16,
                })
            }
            CONGESTION_INDICATIONS => Ok(Self::CongestionIndications(decode_u32(value)?)),
            CONCERNED_DESTINATION => Ok(Self::ConcernedDestination(decode_u32(value)?)),
            DESTINATION_POINT_CODE => Ok(Self::DestinationPointCode(decode_u32(value)?)),
            PROTOCOL_DATA => Ok(Self::ProtocolData(ProtocolData::decode(value)?)),
            _ => Ok(Self::Opaque {
                tag,
                value: Bytes::copy_from_slice(value),
            }),
        }
    }
}

/// Padding octets needed after a value of the given length.
pub fn padding(value_len: usize) -> usize {
    (4 - value_len % 4) % 4
}

/// Walk a flat TLV sequence, decoding known tags into typed parameters.
pub fn decode_params(b: &[u8]) -> Result<Vec<Param>, CodecError> {
    walk(b, Param::decode)
}

/// Walk a flat TLV sequence, preserving every parameter as raw `Opaque`.
/// Used for Generic and passthrough messages that must re-encode
/// byte-identically.
pub fn decode_params_raw(b: &[u8]) -> Result<Vec<Param>, CodecError> {
    walk(b, |tag, value| {
        Ok(Param::Opaque {
            tag,
            value: Bytes::copy_from_slice(value),
        })
    })
}

fn walk<F>(mut b: &[u8], decode: F) -> Result<Vec<Param>, CodecError>
where
    F: Fn(u16, &[u8]) -> Result<Param, CodecError>,
{
    let mut params = Vec::new();
    while !b.is_empty() {
        if b.len() < 4 {
            return Err(CodecError::DecodeShort);
        }
        let tag = u16::from_be_bytes([b[0], b[1]]);
        let length = u16::from_be_bytes([b[2], b[3]]) as usize;
        if length < 4 {
            return Err(CodecError::InvalidLength(length));
        }
        if b.len() < length {
            return Err(CodecError::DecodeShort);
        }
        params.push(decode(tag, &b[4..length])?);

        // The declared length never includes the trailing padding.
        let advance = length + padding(length - 4);
        if b.len() <= advance {
            break;
        }
        b = &b[advance..];
    }
    Ok(params)
}

pub fn encode_params(params: &[Param], buf: &mut BytesMut) {
    for p in params {
        p.encode(buf);
    }
}

/// MTP3 routing label and user data carried in the Protocol Data parameter.
///
/// Fixed inner layout: OPC(4), DPC(4), SI(1), NI(1), MP(1), SLS(1),
/// then the opaque user payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolData {
    /// Originating Point Code
    pub opc: u32,
    /// Destination Point Code
    pub dpc: u32,
    /// Service Indicator (SCCP = 3)
    pub si: u8,
    /// Network Indicator
    pub ni: u8,
    /// Message Priority
    pub mp: u8,
    /// Signaling Link Selection
    pub sls: u8,
    /// User data (e.g. an SCCP message)
    pub data: Bytes,
}

impl ProtocolData {
    pub fn new(opc: u32, dpc: u32, si: u8, ni: u8, mp: u8, sls: u8, data: Bytes) -> Self {
        Self {
            opc,
            dpc,
            si,
            ni,
            mp,
            sls,
            data,
        }
    }

    /// Protocol data wrapping an SCCP payload.
    pub fn sccp(opc: u32, dpc: u32, ni: u8, data: Bytes) -> Self {
        Self::new(opc, dpc, crate::types::SI_SCCP, ni, 0, 0, data)
    }

    pub fn encoded_len(&self) -> usize {
        12 + self.data.len()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.opc);
        buf.put_u32(self.dpc);
        buf.put_u8(self.si);
        buf.put_u8(self.ni);
        buf.put_u8(self.mp);
        buf.put_u8(self.sls);
        buf.put_slice(&self.data);
    }

    pub fn decode(b: &[u8]) -> Result<Self, CodecError> {
        if b.len() < 12 {
            return Err(CodecError::DecodeShort);
        }
        let mut buf = b;
        Ok(Self {
            opc: buf.get_u32(),
            dpc: buf.get_u32(),
            si: buf.get_u8(),
            ni: buf.get_u8(),
            mp: buf.get_u8(),
            sls: buf.get_u8(),
            data: Bytes::copy_from_slice(buf),
        })
    }
}

fn decode_u32(b: &[u8]) -> Result<u32, CodecError> {
    if b.len() != 4 {
        return Err(CodecError::InvalidLength(b.len()));
    }
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn decode_u32s(b: &[u8]) -> Result<Vec<u32>, CodecError> {
    if b.len() % 4 != 0 {
        return Err(CodecError::InvalidLength(b.len()));
    }
    Ok(b.chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_round_trip() {
        let cases = vec![
            Param::InfoString("deadbeef".to_string()),
            Param::RoutingContext(vec![1, 2]),
            Param::HeartbeatData(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef])),
            Param::TrafficModeType(TrafficModeType::Loadshare),
            Param::ErrorCode(ERR_INVALID_STREAM_IDENTIFIER),
            Param::Status {
                status_type: 1,
                status_info: 3,
            },
            Param::AspIdentifier(1),
            Param::AffectedPointCode(vec![0x0000_1234]),
            Param::NetworkAppearance(5),
            Param::UserCause { cause: 0, user: 3 },
            Param::ProtocolData(ProtocolData::new(
                0x1111_1111,
                0x2222_2222,
                3,
                0,
                0,
                1,
                Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
            )),
            Param::Opaque {
                tag: 0x8001,
                value: Bytes::from_static(&[0xde, 0xad]),
            },
        ];

        for p in cases {
            let mut buf = BytesMut::new();
            p.encode(&mut buf);
            assert_eq!(buf.len(), p.encoded_len(), "{:?}", p);
            assert_eq!(buf.len() % 4, 0, "{:?}", p);
            let decoded = decode_params(&buf).unwrap();
            assert_eq!(decoded, vec![p]);
        }
    }

    #[test]
    fn test_declared_length_excludes_padding() {
        // 5-byte value: declared length 9, padded to 12 on the wire.
        let p = Param::InfoString("hello".to_string());
        let mut buf = BytesMut::new();
        p.encode(&mut buf);
        assert_eq!(buf.len(), 12);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 9);
        assert_eq!(&buf[9..12], &[0, 0, 0]);
    }

    #[test]
    fn test_multi_param_walk() {
        let mut buf = BytesMut::new();
        let a = Param::AspIdentifier(7);
        let b = Param::InfoString("x".to_string());
        a.encode(&mut buf);
        b.encode(&mut buf);
        let decoded = decode_params(&buf).unwrap();
        assert_eq!(decoded, vec![a, b]);
    }

    #[test]
    fn test_truncated_tlv() {
        // Declared length longer than the available bytes.
        let raw = [0x00, 0x09, 0x00, 0x10, 0xde, 0xad];
        assert_eq!(decode_params(&raw), Err(CodecError::DecodeShort));
    }

    #[test]
    fn test_invalid_tlv_length() {
        let raw = [0x00, 0x09, 0x00, 0x02];
        assert_eq!(decode_params(&raw), Err(CodecError::InvalidLength(2)));
    }

    #[test]
    fn test_protocol_data_round_trip() {
        let pd = ProtocolData::sccp(
            0x1111_1111,
            0x2222_2222,
            0,
            Bytes::from_static(&[1, 2, 3, 4, 5]),
        );
        let mut buf = BytesMut::new();
        pd.encode(&mut buf);
        assert_eq!(buf.len(), pd.encoded_len());
        let decoded = ProtocolData::decode(&buf).unwrap();
        assert_eq!(decoded, pd);
        assert_eq!(decoded.si, crate::types::SI_SCCP);
    }

    #[test]
    fn test_protocol_data_too_short() {
        assert_eq!(
            ProtocolData::decode(&[0u8; 11]),
            Err(CodecError::DecodeShort)
        );
    }
}
