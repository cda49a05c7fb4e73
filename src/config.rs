//! Discovery configuration.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{
    ANNOUNCEMENT_GROUP, ConfigError, DEFAULT_MAX_PACKET_SIZE, DEFAULT_SOCKET_TIMEOUT,
    DEFAULT_TIME_TO_LIVE, DISCOVERY_PORT, MAX_DATAGRAM_SIZE, MIN_MAX_PACKET_SIZE,
    PLAINTEXT_FORMAT_NAME, REQUEST_GROUP,
};

/// Formats this crate can build from configuration.
pub const KNOWN_FORMATS: &[&str] = &[PLAINTEXT_FORMAT_NAME];

/// Discovery configuration, loadable from JSON.
///
/// Values here are defaults; invocation constraints override them per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Multicast group for requests (default: 224.0.1.85)
    #[serde(default = "default_request_group")]
    pub request_group: Ipv4Addr,

    /// Multicast group for announcements (default: 224.0.1.84)
    #[serde(default = "default_announcement_group")]
    pub announcement_group: Ipv4Addr,

    /// Discovery port, multicast and unicast (default: 4160)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enabled format names, in preference order
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    /// Max multicast packet size when unconstrained (bytes)
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Multicast time to live when unconstrained
    #[serde(default = "default_time_to_live")]
    pub time_to_live: u8,

    /// Unicast socket timeout when unconstrained (milliseconds)
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,

    /// Multicast socket receive buffer (bytes)
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,

    /// Deliver our own multicast datagrams back to us
    #[serde(default)]
    pub multicast_loopback: bool,
}

fn default_request_group() -> Ipv4Addr {
    REQUEST_GROUP
}

fn default_announcement_group() -> Ipv4Addr {
    ANNOUNCEMENT_GROUP
}

fn default_port() -> u16 {
    DISCOVERY_PORT
}

fn default_formats() -> Vec<String> {
    vec![PLAINTEXT_FORMAT_NAME.to_string()]
}

fn default_max_packet_size() -> usize {
    DEFAULT_MAX_PACKET_SIZE
}

fn default_time_to_live() -> u8 {
    DEFAULT_TIME_TO_LIVE
}

fn default_socket_timeout_ms() -> u64 {
    DEFAULT_SOCKET_TIMEOUT.as_millis() as u64
}

fn default_recv_buffer_size() -> usize {
    256 * 1024
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            request_group: default_request_group(),
            announcement_group: default_announcement_group(),
            port: default_port(),
            formats: default_formats(),
            max_packet_size: default_max_packet_size(),
            time_to_live: default_time_to_live(),
            socket_timeout_ms: default_socket_timeout_ms(),
            recv_buffer_size: default_recv_buffer_size(),
            multicast_loopback: false,
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Socket timeout as a `Duration`.
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if self.max_packet_size < MIN_MAX_PACKET_SIZE {
            return Err(ConfigError::InvalidValue(format!(
                "max_packet_size {} below minimum {}",
                self.max_packet_size, MIN_MAX_PACKET_SIZE
            )));
        }
        if self.max_packet_size > MAX_DATAGRAM_SIZE {
            return Err(ConfigError::InvalidValue(format!(
                "max_packet_size {} above maximum {}",
                self.max_packet_size, MAX_DATAGRAM_SIZE
            )));
        }
        if self.formats.is_empty() {
            return Err(ConfigError::InvalidValue("formats cannot be empty".into()));
        }
        if let Some(unknown) = self
            .formats
            .iter()
            .find(|name| !KNOWN_FORMATS.contains(&name.as_str()))
        {
            return Err(ConfigError::UnknownFormat(unknown.clone()));
        }
        if !self.request_group.is_multicast() || !self.announcement_group.is_multicast() {
            return Err(ConfigError::InvalidValue(
                "discovery groups must be multicast addresses".into(),
            ));
        }
        Ok(())
    }
}
