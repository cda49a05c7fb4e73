//! Invocation constraint values.
//!
//! A constraint is one requirement or preference placed on a discovery
//! attempt. The discovery layer reduces the six discovery kinds itself;
//! everything else is passed upward as unfulfilled.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, SystemTime};

use crate::core::DiscoveryError;

/// Discriminant of an [`InvocationConstraint`], used to filter by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Discovery protocol version selector.
    ProtocolVersion,
    /// Maximum multicast packet size.
    MaxPacketSize,
    /// Multicast time to live.
    TimeToLive,
    /// Unicast socket read timeout.
    SocketTimeout,
    /// Absolute connection deadline.
    ConnectionAbsoluteTime,
    /// Connection deadline relative to the start of the attempt.
    ConnectionRelativeTime,
    /// Message integrity.
    Integrity,
    /// Message confidentiality.
    Confidentiality,
    /// Client authentication.
    ClientAuthentication,
    /// Server authentication.
    ServerAuthentication,
    /// Constraint only an upper layer understands.
    Opaque,
    /// Alternatives wrapper.
    Alternatives,
}

impl ConstraintKind {
    /// Whether the discovery layer resolves this kind itself.
    pub fn is_discovery(self) -> bool {
        matches!(
            self,
            Self::ProtocolVersion
                | Self::MaxPacketSize
                | Self::TimeToLive
                | Self::SocketTimeout
                | Self::ConnectionAbsoluteTime
                | Self::ConnectionRelativeTime
        )
    }
}

/// One requirement or preference.
///
/// Equality, ordering and hashing are structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvocationConstraint {
    /// Use this discovery protocol version.
    ProtocolVersion(u32),
    /// Multicast datagrams no larger than this many bytes.
    MaxPacketSize(usize),
    /// Multicast time to live.
    TimeToLive(u8),
    /// Unicast socket read timeout.
    SocketTimeout(Duration),
    /// Connection must complete by this time.
    ConnectionAbsoluteTime(SystemTime),
    /// Connection must complete within this long of starting.
    ConnectionRelativeTime(Duration),
    /// Require (`true`) or forbid (`false`) message integrity.
    Integrity(bool),
    /// Require (`true`) or forbid (`false`) confidentiality.
    Confidentiality(bool),
    /// Require (`true`) or forbid (`false`) client authentication.
    ClientAuthentication(bool),
    /// Require (`true`) or forbid (`false`) server authentication.
    ServerAuthentication(bool),
    /// A constraint checked by an upper layer, identified by name.
    Opaque(String),
    /// Any one of a set of constraints suffices.
    Alternatives(ConstraintAlternatives),
}

impl InvocationConstraint {
    /// Build an alternatives constraint.
    ///
    /// Nested alternatives are flattened and a single distinct element is
    /// returned as itself. An empty set is rejected.
    pub fn alternatives(
        constraints: impl IntoIterator<Item = InvocationConstraint>,
    ) -> Result<Self, DiscoveryError> {
        let mut set = BTreeSet::new();
        for c in constraints {
            match c {
                Self::Alternatives(alts) => set.extend(alts.0),
                other => {
                    set.insert(other);
                }
            }
        }
        if set.len() > 1 {
            return Ok(Self::Alternatives(ConstraintAlternatives(set)));
        }
        set.pop_first()
            .ok_or_else(|| DiscoveryError::InvalidArgument("alternatives cannot be empty".into()))
    }

    /// Discriminant of this constraint.
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::ProtocolVersion(_) => ConstraintKind::ProtocolVersion,
            Self::MaxPacketSize(_) => ConstraintKind::MaxPacketSize,
            Self::TimeToLive(_) => ConstraintKind::TimeToLive,
            Self::SocketTimeout(_) => ConstraintKind::SocketTimeout,
            Self::ConnectionAbsoluteTime(_) => ConstraintKind::ConnectionAbsoluteTime,
            Self::ConnectionRelativeTime(_) => ConstraintKind::ConnectionRelativeTime,
            Self::Integrity(_) => ConstraintKind::Integrity,
            Self::Confidentiality(_) => ConstraintKind::Confidentiality,
            Self::ClientAuthentication(_) => ConstraintKind::ClientAuthentication,
            Self::ServerAuthentication(_) => ConstraintKind::ServerAuthentication,
            Self::Opaque(_) => ConstraintKind::Opaque,
            Self::Alternatives(_) => ConstraintKind::Alternatives,
        }
    }

    /// Whether the discovery layer can fulfill this constraint.
    ///
    /// Alternatives count as fulfillable when at least one member is.
    pub fn is_discovery_fulfillable(&self) -> bool {
        match self {
            Self::Alternatives(alts) => alts.iter().any(|c| c.kind().is_discovery()),
            other => other.kind().is_discovery(),
        }
    }

    /// Rewrite relative connection times as absolute ones based at `now`.
    pub fn make_absolute(&self, now: SystemTime) -> Self {
        match self {
            Self::ConnectionRelativeTime(d) => Self::ConnectionAbsoluteTime(deadline_after(now, *d)),
            Self::Alternatives(alts) => Self::Alternatives(ConstraintAlternatives(
                alts.iter().map(|c| c.make_absolute(now)).collect(),
            )),
            other => other.clone(),
        }
    }
}

impl fmt::Display for InvocationConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolVersion(v) => write!(f, "protocol version {}", v),
            Self::MaxPacketSize(n) => write!(f, "max packet size {}", n),
            Self::TimeToLive(ttl) => write!(f, "time to live {}", ttl),
            Self::SocketTimeout(d) => write!(f, "socket timeout {:?}", d),
            Self::ConnectionAbsoluteTime(t) => write!(f, "connection deadline {:?}", t),
            Self::ConnectionRelativeTime(d) => write!(f, "connection time {:?}", d),
            Self::Integrity(b) => write!(f, "integrity {}", yes_no(*b)),
            Self::Confidentiality(b) => write!(f, "confidentiality {}", yes_no(*b)),
            Self::ClientAuthentication(b) => write!(f, "client authentication {}", yes_no(*b)),
            Self::ServerAuthentication(b) => write!(f, "server authentication {}", yes_no(*b)),
            Self::Opaque(name) => write!(f, "{}", name),
            Self::Alternatives(alts) => {
                write!(f, "one of [")?;
                for (i, c) in alts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

/// Absolute time `d` after `now`, saturating instead of overflowing.
pub(crate) fn deadline_after(now: SystemTime, d: Duration) -> SystemTime {
    now.checked_add(d)
        .or_else(|| now.checked_add(Duration::from_secs(u64::from(u32::MAX))))
        .unwrap_or(now)
}

/// Members of an alternatives constraint. Never empty, never nested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintAlternatives(BTreeSet<InvocationConstraint>);

impl ConstraintAlternatives {
    /// Iterate the members in order.
    pub fn iter(&self) -> impl Iterator<Item = &InvocationConstraint> {
        self.0.iter()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Requirements and preferences for one discovery attempt.
///
/// The two sets are disjoint: a constraint that is both required and
/// preferred is kept only as a requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationConstraints {
    requirements: BTreeSet<InvocationConstraint>,
    preferences: BTreeSet<InvocationConstraint>,
}

impl InvocationConstraints {
    /// Create constraints from requirements and preferences.
    pub fn new(
        requirements: impl IntoIterator<Item = InvocationConstraint>,
        preferences: impl IntoIterator<Item = InvocationConstraint>,
    ) -> Self {
        let requirements: BTreeSet<_> = requirements.into_iter().collect();
        let preferences = preferences
            .into_iter()
            .filter(|c| !requirements.contains(c))
            .collect();
        Self {
            requirements,
            preferences,
        }
    }

    /// No constraints at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Requirements only.
    pub fn required(requirements: impl IntoIterator<Item = InvocationConstraint>) -> Self {
        Self::new(requirements, [])
    }

    /// Preferences only.
    pub fn preferred(preferences: impl IntoIterator<Item = InvocationConstraint>) -> Self {
        Self::new([], preferences)
    }

    /// The requirements.
    pub fn requirements(&self) -> &BTreeSet<InvocationConstraint> {
        &self.requirements
    }

    /// The preferences.
    pub fn preferences(&self) -> &BTreeSet<InvocationConstraint> {
        &self.preferences
    }

    /// Whether there are neither requirements nor preferences.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.preferences.is_empty()
    }

    /// Same requirements, no preferences.
    pub fn requirements_only(&self) -> Self {
        Self {
            requirements: self.requirements.clone(),
            preferences: BTreeSet::new(),
        }
    }

    /// Rewrite every relative connection time as absolute, based at `now`.
    pub fn make_absolute(&self, now: SystemTime) -> Self {
        Self::new(
            self.requirements.iter().map(|c| c.make_absolute(now)),
            self.preferences.iter().map(|c| c.make_absolute(now)),
        )
    }
}
