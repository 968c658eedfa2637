//! Endpoint configuration

use crate::types::TrafficModeType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Heartbeat (BEAT) settings.
///
/// An interval of zero disables the engine regardless of `enabled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatInfo {
    pub enabled: bool,
    /// Sleep between successful beats, in milliseconds.
    pub interval_ms: u64,
    /// Maximum wait for a Heartbeat Ack before failure, in milliseconds.
    pub timer_ms: u64,
}

impl HeartbeatInfo {
    pub fn new(interval: Duration, timer: Duration) -> Self {
        Self {
            enabled: true,
            interval_ms: interval.as_millis() as u64,
            timer_ms: timer.as_millis() as u64,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timer(&self) -> Duration {
        Duration::from_millis(self.timer_ms)
    }

    /// Whether the engine actually runs.
    pub fn active(&self) -> bool {
        self.enabled && self.interval_ms != 0
    }
}

impl Default for HeartbeatInfo {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 0,
            timer_ms: 5000,
        }
    }
}

/// Delayed-ACK tuning handed to the transport right after association.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SackInfo {
    pub enabled: bool,
    /// Delayed ACK timeout in milliseconds, within [200, 500] (RFC 4960).
    pub delay_ms: u64,
    /// ACK every n-th packet; 1 disables delayed ACK.
    pub frequency: u32,
}

impl Default for SackInfo {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: 200,
            frequency: 1,
        }
    }
}

/// Configuration for an M3UA endpoint, client or server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Heartbeat settings.
    pub heartbeat: HeartbeatInfo,
    /// Transport delayed-ACK tuning.
    pub sack: SackInfo,
    /// Proposed outbound stream count for the transport handshake.
    pub streams: u16,
    /// Included in ASP Up if set.
    pub asp_identifier: Option<u32>,
    /// SGP only: reject an ASP Up that carries no ASP Identifier.
    pub require_asp_identifier: bool,
    /// Included in ASP Active if set.
    pub traffic_mode: Option<TrafficModeType>,
    /// Included in Data and SSNM messages when set.
    pub network_appearance: Option<u32>,
    /// Included in ASP Active and Data.
    pub routing_contexts: Option<Vec<u32>>,
    /// Included in Data if set.
    pub correlation_id: Option<u32>,
    /// Default MTP3 routing for payload writes.
    pub originating_point_code: u32,
    pub destination_point_code: u32,
    /// Default MTP3 fields for payload writes.
    pub service_indicator: u8,
    pub network_indicator: u8,
    pub message_priority: u8,
    pub signaling_link_selection: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatInfo::default(),
            sack: SackInfo::default(),
            streams: 2,
            asp_identifier: None,
            require_asp_identifier: false,
            traffic_mode: None,
            network_appearance: None,
            routing_contexts: None,
            correlation_id: None,
            originating_point_code: 0,
            destination_point_code: 0,
            service_indicator: crate::types::SI_SCCP,
            network_indicator: 0,
            message_priority: 0,
            signaling_link_selection: 0,
        }
    }
}

impl Config {
    /// Create a new Config with the MTP3 routing defaults filled in.
    pub fn new(opc: u32, dpc: u32, si: u8, ni: u8, mp: u8, sls: u8) -> Self {
        Self {
            originating_point_code: opc,
            destination_point_code: dpc,
            service_indicator: si,
            network_indicator: ni,
            message_priority: mp,
            signaling_link_selection: sls,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Enable heartbeats with the given interval and expiration timer.
    pub fn enable_heartbeat(mut self, interval: Duration, timer: Duration) -> Self {
        self.heartbeat = HeartbeatInfo::new(interval, timer);
        self
    }

    pub fn with_asp_identifier(mut self, id: u32) -> Self {
        self.asp_identifier = Some(id);
        self
    }

    pub fn with_traffic_mode(mut self, tmt: TrafficModeType) -> Self {
        self.traffic_mode = Some(tmt);
        self
    }

    pub fn with_network_appearance(mut self, na: u32) -> Self {
        self.network_appearance = Some(na);
        self
    }

    pub fn with_routing_contexts(mut self, rcs: Vec<u32>) -> Self {
        self.routing_contexts = Some(rcs);
        self
    }

    pub fn with_correlation_id(mut self, id: u32) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_streams(mut self, streams: u16) -> Self {
        self.streams = streams;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_active() {
        let mut hb = HeartbeatInfo::default();
        assert!(!hb.active());

        hb.enabled = true;
        assert!(!hb.active(), "zero interval must keep the engine disabled");

        hb.interval_ms = 200;
        assert!(hb.active());
        assert_eq!(hb.interval(), Duration::from_millis(200));
    }

    #[test]
    fn test_builder_chain() {
        let cfg = Config::new(1, 2, 3, 0, 0, 1)
            .enable_heartbeat(Duration::from_millis(200), Duration::from_secs(1))
            .with_asp_identifier(7)
            .with_routing_contexts(vec![1, 2])
            .with_traffic_mode(TrafficModeType::Loadshare);
        assert!(cfg.heartbeat.active());
        assert_eq!(cfg.asp_identifier, Some(7));
        assert_eq!(cfg.routing_contexts, Some(vec![1, 2]));
        assert_eq!(cfg.originating_point_code, 1);
        assert_eq!(cfg.destination_point_code, 2);
    }

    #[test]
    fn test_json_round_trip() {
        let cfg = Config::new(0x11, 0x22, 3, 2, 0, 1).with_streams(4);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.originating_point_code, 0x11);
        assert_eq!(back.streams, 4);
    }
}
