//! Runtime configuration for room sessions and transports.
//!
//! Both structs deserialize from JSON with every field optional, so a config
//! file only needs the values it overrides.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SERVICE_TYPE: &str = "ontable-room";
const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;
const DEFAULT_EVENT_CAPACITY: usize = 256;
const DEFAULT_DISCOVERY_PORT: u16 = 47_474;
const DEFAULT_BEACON_INTERVAL_MS: u64 = 1_000;
const MAX_SERVICE_TYPE_LEN: usize = 15;

/// Settings for a room session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// How long a guest waits for the host to accept a connection
    pub connect_timeout_ms: u64,
    /// Inbound payloads larger than this are dropped undecoded
    pub max_payload_bytes: usize,
    /// Buffered session events per subscriber before slow readers lag
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_ms == 0 {
            return Err("connect_timeout_ms must be greater than zero".to_string());
        }
        if self.max_payload_bytes == 0 {
            return Err("max_payload_bytes must be greater than zero".to_string());
        }
        if self.event_capacity == 0 {
            return Err("event_capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Settings for the LAN transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LanConfig {
    /// Discovery service name; browsers only report rooms with the same value
    pub service_type: String,
    /// UDP port carrying discovery beacons
    pub discovery_port: u16,
    /// Local address browsers listen on for beacons
    pub bind_addr: IpAddr,
    /// Destination of advertising beacons, normally the broadcast address
    pub beacon_target: IpAddr,
    pub beacon_interval_ms: u64,
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            beacon_target: IpAddr::V4(Ipv4Addr::BROADCAST),
            beacon_interval_ms: DEFAULT_BEACON_INTERVAL_MS,
        }
    }
}

impl LanConfig {
    /// Loopback-only settings, for running host and guest on one machine
    #[must_use]
    pub fn loopback(discovery_port: u16) -> Self {
        Self {
            discovery_port,
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            beacon_target: IpAddr::V4(Ipv4Addr::LOCALHOST),
            beacon_interval_ms: 100,
            ..Self::default()
        }
    }

    /// Check value ranges.
    ///
    /// Service types follow the usual DNS-SD rules: 1-15 characters of
    /// lowercase ASCII letters, digits and inner hyphens.
    pub fn validate(&self) -> Result<(), String> {
        if self.beacon_interval_ms == 0 {
            return Err("beacon_interval_ms must be greater than zero".to_string());
        }

        let service = self.service_type.as_str();
        let valid_chars = service
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if service.is_empty()
            || service.len() > MAX_SERVICE_TYPE_LEN
            || !valid_chars
            || service.starts_with('-')
            || service.ends_with('-')
        {
            return Err(format!(
                "service_type '{service}' must be 1-{MAX_SERVICE_TYPE_LEN} lowercase letters, digits or inner hyphens"
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn discovery_bind(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.discovery_port)
    }

    #[must_use]
    pub const fn beacon_addr(&self) -> SocketAddr {
        SocketAddr::new(self.beacon_target, self.discovery_port)
    }

    #[must_use]
    pub const fn beacon_interval(&self) -> Duration {
        Duration::from_millis(self.beacon_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parse_accepts_partial_config() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "connect_timeout_ms": 500 }"#).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.connect_timeout(), Duration::from_millis(500));
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let error = serde_json::from_str::<SessionConfig>(r#"{ "timeout": 5 }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn service_type_rules() {
        for bad in ["", "Upper", "way-too-long-service", "-lead", "trail-", "under_score"] {
            let config = LanConfig {
                service_type: bad.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn lan_defaults_broadcast_on_discovery_port() {
        let config = LanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.beacon_addr().to_string(), "255.255.255.255:47474");
        assert_eq!(config.discovery_bind().to_string(), "0.0.0.0:47474");
    }
}
