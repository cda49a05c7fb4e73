//! Per-attempt negotiation record.
//!
//! A [`ConnectionContext`] captures the parameters resolved for one unicast
//! discovery attempt with one format: timing from the discovery constraints
//! and the security properties of the format's provider.

use std::time::{Duration, SystemTime};

use super::constraint::{InvocationConstraint, InvocationConstraints};
use super::discovery::DiscoveryConstraints;
use crate::core::UnsupportedConstraintError;
use crate::format::FormatId;

/// Security properties a format provides on a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityProperties {
    /// Message contents are integrity protected.
    pub integrity: bool,
    /// Message contents are encrypted.
    pub confidentiality: bool,
    /// The client is authenticated to the server.
    pub client_authentication: bool,
    /// The server is authenticated to the client.
    pub server_authentication: bool,
}

impl SecurityProperties {
    /// No security at all.
    pub const NONE: Self = Self {
        integrity: false,
        confidentiality: false,
        client_authentication: false,
        server_authentication: false,
    };

    /// Whether a connection with these properties satisfies `constraint`.
    ///
    /// Discovery kinds are handled by [`DiscoveryConstraints`] and always
    /// pass here. Opaque constraints never pass.
    pub fn satisfies(&self, constraint: &InvocationConstraint) -> bool {
        match constraint {
            InvocationConstraint::Integrity(b) => self.integrity == *b,
            InvocationConstraint::Confidentiality(b) => self.confidentiality == *b,
            InvocationConstraint::ClientAuthentication(b) => self.client_authentication == *b,
            InvocationConstraint::ServerAuthentication(b) => self.server_authentication == *b,
            InvocationConstraint::Alternatives(alts) => alts.iter().any(|c| self.satisfies(c)),
            InvocationConstraint::Opaque(_) => false,
            _ => true,
        }
    }
}

/// Resolved parameters for one connection attempt with one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    format_id: FormatId,
    format_name: String,
    protocol_version: u32,
    security: SecurityProperties,
    preferences_satisfied: usize,
    constraints: DiscoveryConstraints,
}

impl ConnectionContext {
    /// Check `constraints` against a format and record the outcome.
    ///
    /// Fails if the constraints conflict, if `protocol_version` is not
    /// acceptable, or if a requirement left unfulfilled by the discovery
    /// layer cannot be met by `security`.
    pub fn establish(
        format_id: FormatId,
        format_name: &str,
        protocol_version: u32,
        security: SecurityProperties,
        constraints: &InvocationConstraints,
    ) -> Result<Self, UnsupportedConstraintError> {
        let context = Self::selected(format_id, format_name, protocol_version, security, constraints)?;

        let unmet: Vec<_> = context
            .constraints
            .unfulfilled_constraints()
            .requirements()
            .iter()
            .filter(|c| !security.satisfies(c))
            .cloned()
            .collect();
        if !unmet.is_empty() {
            return Err(UnsupportedConstraintError::new(
                format!("format {} ({}) cannot satisfy requirements", format_name, format_id),
                unmet,
            ));
        }
        Ok(context)
    }

    /// Record a format whose provider already accepted `constraints`.
    ///
    /// Only the discovery constraints and the protocol version are checked;
    /// unfulfilled requirements are the provider's concern.
    pub(crate) fn selected(
        format_id: FormatId,
        format_name: &str,
        protocol_version: u32,
        security: SecurityProperties,
        constraints: &InvocationConstraints,
    ) -> Result<Self, UnsupportedConstraintError> {
        let dc = DiscoveryConstraints::process(constraints)?;
        dc.check_protocol_version(protocol_version)?;

        let preferences_satisfied = dc
            .unfulfilled_constraints()
            .preferences()
            .iter()
            .filter(|c| security.satisfies(c))
            .count();

        Ok(Self {
            format_id,
            format_name: format_name.to_string(),
            protocol_version,
            security,
            preferences_satisfied,
            constraints: dc,
        })
    }

    /// Negotiated format id.
    pub fn format_id(&self) -> FormatId {
        self.format_id
    }

    /// Negotiated format name.
    pub fn format_name(&self) -> &str {
        &self.format_name
    }

    /// Protocol version of the exchange.
    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// Security properties of the format.
    pub fn security(&self) -> SecurityProperties {
        self.security
    }

    /// Number of unfulfilled preferences the format happens to satisfy.
    pub fn preferences_satisfied(&self) -> usize {
        self.preferences_satisfied
    }

    /// Connection deadline, or `default`.
    pub fn connection_deadline(&self, default: SystemTime) -> SystemTime {
        self.constraints.connection_deadline(default)
    }

    /// Socket timeout, or `default`.
    pub fn socket_timeout(&self, default: Duration) -> Duration {
        self.constraints.socket_timeout(default)
    }

    /// The processed discovery constraints.
    pub fn discovery_constraints(&self) -> &DiscoveryConstraints {
        &self.constraints
    }
}
