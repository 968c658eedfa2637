//! Common types shared across the M3UA layers

use serde::{Deserialize, Serialize};

/// Traffic Mode Type carried in ASP Active / ASP Active Ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum TrafficModeType {
    Override = 1,
    Loadshare = 2,
    Broadcast = 3,
}

impl TrafficModeType {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Override),
            2 => Some(Self::Loadshare),
            3 => Some(Self::Broadcast),
            _ => None,
        }
    }

    pub fn value(&self) -> u32 {
        *self as u32
    }
}

/// Service Indicator definitions (MTP3 user parts).
pub const SI_SCCP: u8 = 3;
pub const SI_TUP: u8 = 4;
pub const SI_ISUP: u8 = 5;
pub const SI_BROADBAND_ISUP: u8 = 7;
pub const SI_SATELLITE_ISUP: u8 = 8;

/// Notify Status Type values.
pub const STATUS_TYPE_AS_STATE_CHANGE: u16 = 1;
pub const STATUS_TYPE_OTHER: u16 = 2;

/// Notify Status Information values (Status Type = AS State Change).
pub const STATUS_INFO_AS_INACTIVE: u16 = 2;
pub const STATUS_INFO_AS_ACTIVE: u16 = 3;
pub const STATUS_INFO_AS_PENDING: u16 = 4;

/// Notify Status Information values (Status Type = Other).
pub const STATUS_INFO_INSUFFICIENT_RESOURCES: u16 = 1;
pub const STATUS_INFO_ALTERNATE_ASP_ACTIVE: u16 = 2;
pub const STATUS_INFO_ASP_FAILURE: u16 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_mode_round_trip() {
        for v in 1..=3u32 {
            let tmt = TrafficModeType::from_u32(v).unwrap();
            assert_eq!(tmt.value(), v);
        }
        assert_eq!(TrafficModeType::from_u32(0), None);
        assert_eq!(TrafficModeType::from_u32(4), None);
    }
}
