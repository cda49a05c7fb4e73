//! Discovery-specific constraint processing.
//!
//! [`DiscoveryConstraints::process`] resolves the six discovery constraint
//! kinds into concrete protocol parameters and leaves everything else to
//! upper layers as unfulfilled constraints.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

use tracing::debug;

use super::constraint::{ConstraintKind, InvocationConstraint, InvocationConstraints};
use super::reducer::ConstraintReducer;
use crate::core::{BIAS_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS, UnsupportedConstraintError};

/// Negotiation policy derived from a set of invocation constraints.
///
/// Immutable once constructed. Unconstrained parameters are `None`
/// internally and resolve to the caller's default through the accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConstraints {
    preferred_protocol_version: u32,
    acceptable_protocol_versions: BTreeSet<u32>,
    connection_deadline: Option<SystemTime>,
    max_packet_size: Option<usize>,
    time_to_live: Option<u8>,
    socket_timeout: Option<Duration>,
    unfulfilled: InvocationConstraints,
}

impl DiscoveryConstraints {
    /// Process constraints, normalizing relative times against the clock.
    pub fn process(constraints: &InvocationConstraints) -> Result<Self, UnsupportedConstraintError> {
        Self::process_at(constraints, SystemTime::now())
    }

    /// Process constraints, normalizing relative times against `now`.
    pub fn process_at(
        constraints: &InvocationConstraints,
        now: SystemTime,
    ) -> Result<Self, UnsupportedConstraintError> {
        let unfulfilled = InvocationConstraints::new(
            unfulfilled_of(constraints.requirements()),
            unfulfilled_of(constraints.preferences()),
        );

        let versions = ConstraintReducer::new(ConstraintKind::ProtocolVersion);
        let required = protocol_versions(&versions.reduce(&constraints.requirements_only())?);
        let supported = BTreeSet::from(SUPPORTED_PROTOCOL_VERSIONS);
        if !required.is_empty() && required.is_disjoint(&supported) {
            return Err(UnsupportedConstraintError::new(
                format!("no supported protocol versions in {:?}", required),
                required.iter().map(|v| InvocationConstraint::ProtocolVersion(*v)),
            ));
        }
        let preferred = protocol_versions(&versions.reduce(constraints)?);
        let preferred_protocol_version = choose_version(&preferred, &required, &supported);

        let max_packet_size = ConstraintReducer::max_wins(ConstraintKind::MaxPacketSize)
            .reduce(constraints)?
            .into_iter()
            .find_map(|c| match c {
                InvocationConstraint::MaxPacketSize(n) => Some(n),
                _ => None,
            });

        let absolute = constraints.make_absolute(now);
        let connection_deadline =
            ConstraintReducer::max_wins(ConstraintKind::ConnectionAbsoluteTime)
                .reduce(&absolute)?
                .into_iter()
                .find_map(|c| match c {
                    InvocationConstraint::ConnectionAbsoluteTime(t) => Some(t),
                    _ => None,
                });

        let time_to_live = ConstraintReducer::new(ConstraintKind::TimeToLive)
            .reduce(constraints)?
            .into_iter()
            .find_map(|c| match c {
                InvocationConstraint::TimeToLive(ttl) => Some(ttl),
                _ => None,
            });

        let socket_timeout = ConstraintReducer::new(ConstraintKind::SocketTimeout)
            .reduce(constraints)?
            .into_iter()
            .find_map(|c| match c {
                InvocationConstraint::SocketTimeout(d) => Some(d),
                _ => None,
            });

        debug!(
            preferred_protocol_version,
            ?required,
            ?max_packet_size,
            ?time_to_live,
            ?socket_timeout,
            "processed discovery constraints"
        );

        Ok(Self {
            preferred_protocol_version,
            acceptable_protocol_versions: required,
            connection_deadline,
            max_packet_size,
            time_to_live,
            socket_timeout,
            unfulfilled,
        })
    }

    /// Protocol version to use when initiating discovery.
    pub fn choose_protocol_version(&self) -> u32 {
        self.preferred_protocol_version
    }

    /// Check a received message's protocol version against the requirements.
    ///
    /// An empty acceptable set accepts any version.
    pub fn check_protocol_version(&self, version: u32) -> Result<(), UnsupportedConstraintError> {
        if self.acceptable_protocol_versions.is_empty()
            || self.acceptable_protocol_versions.contains(&version)
        {
            Ok(())
        } else {
            Err(UnsupportedConstraintError::new(
                format!(
                    "protocol version {} not in acceptable set {:?}",
                    version, self.acceptable_protocol_versions
                ),
                self.acceptable_protocol_versions
                    .iter()
                    .map(|v| InvocationConstraint::ProtocolVersion(*v)),
            ))
        }
    }

    /// Required protocol versions; empty when unconstrained.
    pub fn acceptable_protocol_versions(&self) -> &BTreeSet<u32> {
        &self.acceptable_protocol_versions
    }

    /// Connection deadline, or `default` when unconstrained.
    pub fn connection_deadline(&self, default: SystemTime) -> SystemTime {
        self.connection_deadline.unwrap_or(default)
    }

    /// Whether a connection deadline was constrained.
    pub fn has_connection_deadline(&self) -> bool {
        self.connection_deadline.is_some()
    }

    /// Max multicast packet size, or `default` when unconstrained.
    pub fn max_packet_size(&self, default: usize) -> usize {
        self.max_packet_size.unwrap_or(default)
    }

    /// Multicast time to live, or `default` when unconstrained.
    ///
    /// With several acceptable values the smallest is used.
    pub fn time_to_live(&self, default: u8) -> u8 {
        self.time_to_live.unwrap_or(default)
    }

    /// Unicast socket timeout, or `default` when unconstrained.
    ///
    /// With several acceptable values the smallest is used.
    pub fn socket_timeout(&self, default: Duration) -> Duration {
        self.socket_timeout.unwrap_or(default)
    }

    /// Constraints this layer cannot satisfy, for upper layers to check.
    pub fn unfulfilled_constraints(&self) -> &InvocationConstraints {
        &self.unfulfilled
    }
}

fn unfulfilled_of<'a>(
    constraints: impl IntoIterator<Item = &'a InvocationConstraint>,
) -> Vec<InvocationConstraint> {
    constraints
        .into_iter()
        .filter(|c| !c.is_discovery_fulfillable())
        .cloned()
        .collect()
}

fn protocol_versions(reduced: &BTreeSet<InvocationConstraint>) -> BTreeSet<u32> {
    reduced
        .iter()
        .filter_map(|c| match c {
            InvocationConstraint::ProtocolVersion(v) => Some(*v),
            _ => None,
        })
        .collect()
}

/// Bias version if acceptable, else a supported preferred version, else a
/// supported required version, else the bias version.
fn choose_version(preferred: &BTreeSet<u32>, required: &BTreeSet<u32>, supported: &BTreeSet<u32>) -> u32 {
    if preferred.contains(&BIAS_PROTOCOL_VERSION) || required.contains(&BIAS_PROTOCOL_VERSION) {
        return BIAS_PROTOCOL_VERSION;
    }
    preferred
        .intersection(supported)
        .chain(required.intersection(supported))
        .next()
        .copied()
        .unwrap_or(BIAS_PROTOCOL_VERSION)
}
