//! Error types for discovery negotiation.

use std::io;

use thiserror::Error;

use crate::constraints::InvocationConstraint;
use crate::format::FormatId;

/// A requirement that cannot be satisfied.
///
/// Raised for conflicting requirements of one reducible type, for a required
/// protocol version outside the supported set, and by providers whose
/// security properties cannot meet a requirement.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}: {constraints:?}")]
pub struct UnsupportedConstraintError {
    reason: String,
    constraints: Vec<InvocationConstraint>,
}

impl UnsupportedConstraintError {
    /// Create a new error naming the offending constraints.
    pub fn new(
        reason: impl Into<String>,
        constraints: impl IntoIterator<Item = InvocationConstraint>,
    ) -> Self {
        Self {
            reason: reason.into(),
            constraints: constraints.into_iter().collect(),
        }
    }

    /// Human-readable reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The constraints that could not be satisfied.
    pub fn constraints(&self) -> &[InvocationConstraint] {
        &self.constraints
    }
}

/// Malformed or non-conforming wire data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Peer spoke a different protocol version.
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version this engine speaks.
        expected: u32,
        /// Version found on the wire.
        actual: u32,
    },

    /// No engine exists for the requested version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u32),

    /// Multicast packet of the wrong type.
    #[error("wrong packet type: expected {expected}, got {actual}")]
    WrongPacketType {
        /// Expected packet type.
        expected: u8,
        /// Packet type found on the wire.
        actual: u8,
    },

    /// Format id with no registered provider.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(FormatId),

    /// The peers could not agree on a unicast format.
    #[error("format negotiation failed")]
    NegotiationFailed,

    /// Server selected a format the client never proposed.
    #[error("server selected format {0} which was not proposed")]
    UnexpectedFormat(FormatId),

    /// No local provider could take part in negotiation.
    #[error("no supported formats")]
    NoSupportedFormats,

    /// Input ended before a complete field could be read.
    #[error("data too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Payload structure is invalid.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the configuration file failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be parsed or serialized.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured value is out of range.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Configuration names a format this crate does not provide.
    #[error("unknown format: {0}")]
    UnknownFormat(String),
}

/// Top-level discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Constraints cannot be satisfied.
    #[error("unsupported constraints: {0}")]
    Unsupported(#[from] UnsupportedConstraintError),

    /// Wire protocol violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The subject checker rejected the peer.
    #[error("security check denied: {0}")]
    SecurityDenied(String),

    /// Caller programming error.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error from the transport, passed through unchanged.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl DiscoveryError {
    /// Whether this error came from constraint checking.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// The protocol error, if this is one.
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_names_constraints() {
        let err = UnsupportedConstraintError::new(
            "conflicting requirements",
            [InvocationConstraint::TimeToLive(5)],
        );
        assert_eq!(err.reason(), "conflicting requirements");
        assert_eq!(err.constraints(), &[InvocationConstraint::TimeToLive(5)]);
        assert!(err.to_string().contains("conflicting requirements"));
    }

    #[test]
    fn test_protocol_error_display() {
        assert_eq!(
            ProtocolError::NegotiationFailed.to_string(),
            "format negotiation failed"
        );
        let err = ProtocolError::UnsupportedFormat(FormatId::from_raw(0xab));
        assert_eq!(err.to_string(), "unsupported format: 0x00000000000000ab");
    }

    #[test]
    fn test_discovery_error_conversions() {
        let err: DiscoveryError = ProtocolError::NoSupportedFormats.into();
        assert_eq!(err.as_protocol(), Some(&ProtocolError::NoSupportedFormats));
        assert!(!err.is_unsupported());

        let err: DiscoveryError = UnsupportedConstraintError::new("x", []).into();
        assert!(err.is_unsupported());
    }
}
