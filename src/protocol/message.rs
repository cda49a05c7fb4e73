//! Discovery messages exchanged by the engines.

use std::fmt;

use crate::core::SERVICE_ID_SIZE;

/// 128-bit identifier of a lookup service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(u128);

impl ServiceId {
    /// Create from the most and least significant halves.
    pub const fn new(most_significant: u64, least_significant: u64) -> Self {
        Self(((most_significant as u128) << 64) | least_significant as u128)
    }

    /// Decode from big-endian wire bytes.
    pub const fn from_bytes(bytes: [u8; SERVICE_ID_SIZE]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    /// Big-endian wire encoding.
    pub const fn to_bytes(self) -> [u8; SERVICE_ID_SIZE] {
        self.0.to_be_bytes()
    }

    /// Upper 64 bits.
    pub const fn most_significant(self) -> u64 {
        (self.0 >> 64) as u64
    }

    /// Lower 64 bits.
    pub const fn least_significant(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff
        )
    }
}

/// Sentinel sequence number for announcements that carry none.
pub const NO_SEQUENCE_NUMBER: u64 = u64::MAX;

/// A client looking for lookup services.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MulticastRequest {
    /// Host the requester accepts unicast discovery on. Empty for version 1
    /// requests, whose host is the datagram source.
    pub host: String,
    /// Port the requester accepts unicast discovery on.
    pub port: u16,
    /// Groups of interest; empty means any group.
    pub groups: Vec<String>,
    /// Lookup services that already answered and need not respond.
    pub known_registrars: Vec<ServiceId>,
}

impl MulticastRequest {
    /// Create a request.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Add groups of interest.
    pub fn with_groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Add known lookup services.
    pub fn with_known_registrars(mut self, ids: impl IntoIterator<Item = ServiceId>) -> Self {
        self.known_registrars.extend(ids);
        self
    }
}

/// A lookup service advertising itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastAnnouncement {
    /// Monotonic announcement counter, or [`NO_SEQUENCE_NUMBER`].
    pub sequence_number: u64,
    /// Host accepting unicast discovery.
    pub host: String,
    /// Port accepting unicast discovery.
    pub port: u16,
    /// The announcing lookup service.
    pub service_id: ServiceId,
    /// Groups the lookup service is a member of.
    pub groups: Vec<String>,
}

impl MulticastAnnouncement {
    /// Create an announcement.
    pub fn new(sequence_number: u64, host: impl Into<String>, port: u16, service_id: ServiceId) -> Self {
        Self {
            sequence_number,
            host: host.into(),
            port,
            service_id,
            groups: Vec::new(),
        }
    }

    /// Add member groups.
    pub fn with_groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }
}

/// Result of unicast discovery: where the lookup service is and its proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastResponse {
    /// Lookup service host.
    pub host: String,
    /// Lookup service port.
    pub port: u16,
    /// Groups the lookup service is a member of.
    pub groups: Vec<String>,
    /// Serialized registrar proxy, opaque to this crate.
    pub registrar: Vec<u8>,
}

impl UnicastResponse {
    /// Create a response.
    pub fn new(host: impl Into<String>, port: u16, registrar: Vec<u8>) -> Self {
        Self {
            host: host.into(),
            port,
            groups: Vec::new(),
            registrar,
        }
    }

    /// Add member groups.
    pub fn with_groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }
}
