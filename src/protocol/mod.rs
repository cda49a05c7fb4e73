//! Discovery protocol engines.
//!
//! - [`Discovery`]: the four engine operations for one protocol version
//! - [`DiscoveryV1`]: fixed encoding, no format negotiation
//! - [`DiscoveryV2`]: format-negotiating envelope over the registry
//! - [`decode_multicast_request`], [`decode_multicast_announcement`],
//!   [`accept_unicast`]: dispatch on the version found on the wire

mod datagram;
mod message;
mod unicast;
mod v1;
mod v2;
pub(crate) mod wire;

pub use datagram::{DatagramBuffers, DatagramSet, DatagramSets};
pub(crate) use datagram::{CountWidth, pack_sections};
pub use message::*;
pub use unicast::UnicastExchange;
pub use v1::DiscoveryV1;
pub use v2::DiscoveryV2;

use std::sync::Arc;

use crate::constraints::{ConnectionContext, DiscoveryConstraints, InvocationConstraints};
use crate::core::{DiscoveryError, PROTOCOL_VERSION_1, PROTOCOL_VERSION_2, ProtocolError};
use crate::format::{ByteStream, Decoded, FormatRegistry, SubjectChecker};

/// One protocol version's discovery operations.
///
/// Multicast operations are stateless. Unicast operations own `stream` for
/// the duration of the call and leave deadlines to the transport.
pub trait Discovery: Send + Sync {
    /// Version this engine speaks.
    fn protocol_version(&self) -> u32;

    /// Encode a request into datagram sets, one per format.
    ///
    /// Fails immediately if `max_packet_size` is outside the multicast
    /// limits. Per-format failures surface as items of the sequence.
    fn encode_multicast_request<'a>(
        &'a self,
        request: &'a MulticastRequest,
        max_packet_size: usize,
        constraints: &'a InvocationConstraints,
    ) -> Result<DatagramSets<'a>, DiscoveryError>;

    /// Encode an announcement into datagram sets, one per format.
    fn encode_multicast_announcement<'a>(
        &'a self,
        announcement: &'a MulticastAnnouncement,
        max_packet_size: usize,
        constraints: &'a InvocationConstraints,
    ) -> Result<DatagramSets<'a>, DiscoveryError>;

    /// Decode a complete request datagram.
    fn decode_multicast_request(
        &self,
        packet: &[u8],
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
        delay_constraint_check: bool,
    ) -> Result<Decoded<MulticastRequest>, DiscoveryError>;

    /// Decode a complete announcement datagram.
    fn decode_multicast_announcement(
        &self,
        packet: &[u8],
        constraints: &InvocationConstraints,
        delay_constraint_check: bool,
    ) -> Result<Decoded<MulticastAnnouncement>, DiscoveryError>;

    /// Client side of unicast discovery over a connected stream.
    fn do_unicast_discovery(
        &self,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
    ) -> Result<UnicastExchange, DiscoveryError>;

    /// Server side of unicast discovery. The client's 4-byte protocol
    /// version has already been read from `stream`.
    fn handle_unicast_discovery(
        &self,
        response: &UnicastResponse,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
    ) -> Result<ConnectionContext, DiscoveryError>;
}

/// Engine for `version`.
pub fn discovery_for(
    version: u32,
    registry: &Arc<FormatRegistry>,
) -> Result<Box<dyn Discovery>, ProtocolError> {
    match version {
        PROTOCOL_VERSION_1 => Ok(Box::new(DiscoveryV1::new())),
        PROTOCOL_VERSION_2 => Ok(Box::new(DiscoveryV2::new(Arc::clone(registry)))),
        other => Err(ProtocolError::UnsupportedVersion(other)),
    }
}

/// Engine for the version `constraints` prefer when initiating.
pub fn discovery_for_constraints(
    constraints: &DiscoveryConstraints,
    registry: &Arc<FormatRegistry>,
) -> Result<Box<dyn Discovery>, ProtocolError> {
    discovery_for(constraints.choose_protocol_version(), registry)
}

/// Protocol version of a received datagram.
pub fn packet_version(packet: &[u8]) -> Result<u32, ProtocolError> {
    wire::WireReader::new(packet).u32()
}

fn receiving_engine(
    version: u32,
    registry: &Arc<FormatRegistry>,
    constraints: &InvocationConstraints,
) -> Result<Box<dyn Discovery>, DiscoveryError> {
    DiscoveryConstraints::process(constraints)?.check_protocol_version(version)?;
    Ok(discovery_for(version, registry)?)
}

/// Decode a request datagram of any supported version.
pub fn decode_multicast_request(
    packet: &[u8],
    registry: &Arc<FormatRegistry>,
    constraints: &InvocationConstraints,
    checker: Option<Arc<dyn SubjectChecker>>,
    delay_constraint_check: bool,
) -> Result<Decoded<MulticastRequest>, DiscoveryError> {
    let engine = receiving_engine(packet_version(packet)?, registry, constraints)?;
    engine.decode_multicast_request(packet, constraints, checker, delay_constraint_check)
}

/// Decode an announcement datagram of any supported version.
pub fn decode_multicast_announcement(
    packet: &[u8],
    registry: &Arc<FormatRegistry>,
    constraints: &InvocationConstraints,
    delay_constraint_check: bool,
) -> Result<Decoded<MulticastAnnouncement>, DiscoveryError> {
    let engine = receiving_engine(packet_version(packet)?, registry, constraints)?;
    engine.decode_multicast_announcement(packet, constraints, delay_constraint_check)
}

/// Serve unicast discovery on an accepted connection of any supported
/// version.
pub fn accept_unicast(
    stream: &mut dyn ByteStream,
    registry: &Arc<FormatRegistry>,
    response: &UnicastResponse,
    constraints: &InvocationConstraints,
    checker: Option<Arc<dyn SubjectChecker>>,
) -> Result<ConnectionContext, DiscoveryError> {
    let version = wire::read_u32(stream)?;
    let engine = receiving_engine(version, registry, constraints)?;
    engine.handle_unicast_discovery(response, stream, constraints, checker)
}
