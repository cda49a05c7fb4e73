//! Protocol version 1: fixed encoding, no format negotiation, no security.
//!
//! Multicast request:
//! ```text
//! +0   Protocol version (4 bytes BE32, = 1)
//! +4   Unicast port (4 bytes BE32)
//! +8   Known registrar count M (4 bytes BE32), then M x service id (16 bytes)
//! ...  Group count N (4 bytes BE32), then N x string (BE16 length + UTF-8)
//! ```
//!
//! Multicast announcement:
//! ```text
//! +0   Protocol version (4 bytes BE32, = 1)
//! +4   Host (BE16 length + UTF-8)
//! ...  Unicast port (4 bytes BE32)
//! ...  Service id (16 bytes)
//! ...  Group count N (4 bytes BE32), then N x string
//! ```
//!
//! The requester's host is the datagram's source address, so decoded
//! requests carry an empty host. Trailing bytes are ignored.

use std::io::Write;
use std::sync::Arc;
use std::time::SystemTime;

use super::Discovery;
use super::datagram::{CountWidth, DatagramBuffers, DatagramSet, DatagramSets, pack_sections};
use super::message::{MulticastAnnouncement, MulticastRequest, NO_SEQUENCE_NUMBER, UnicastResponse};
use super::unicast::UnicastExchange;
use super::v2::check_max_packet_size;
use super::wire::{WireReader, put_string, string_item};
use crate::constraints::{ConnectionContext, InvocationConstraints};
use crate::core::{DiscoveryError, PROTOCOL_VERSION_1, ProtocolError};
use crate::format::{
    ByteStream, Decoded, FormatId, SubjectChecker, check_unsecured, read_unicast_response,
    write_unicast_response,
};

/// Name recorded in version 1 connection contexts.
const V1_FORMAT_NAME: &str = "protocol version 1";

/// Version 1 engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryV1;

impl DiscoveryV1 {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }
}

fn check_v1(
    constraints: &InvocationConstraints,
    checker: Option<&dyn SubjectChecker>,
) -> Result<ConnectionContext, DiscoveryError> {
    check_unsecured(FormatId::NULL, V1_FORMAT_NAME, PROTOCOL_VERSION_1, constraints, checker)
}

fn read_version(r: &mut WireReader<'_>) -> Result<(), ProtocolError> {
    let version = r.u32()?;
    if version != PROTOCOL_VERSION_1 {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION_1,
            actual: version,
        });
    }
    Ok(())
}

fn read_port(r: &mut WireReader<'_>) -> Result<u16, ProtocolError> {
    let port = r.u32()?;
    u16::try_from(port).map_err(|_| ProtocolError::Malformed(format!("port {} out of range", port)))
}

fn read_groups(r: &mut WireReader<'_>) -> Result<Vec<String>, ProtocolError> {
    let n = r.u32()?;
    (0..n).map(|_| r.string()).collect()
}

fn decode_request(packet: &[u8]) -> Result<MulticastRequest, DiscoveryError> {
    let mut r = WireReader::new(packet);
    read_version(&mut r)?;
    let port = read_port(&mut r)?;
    let count = r.u32()?;
    let known_registrars = (0..count)
        .map(|_| r.service_id())
        .collect::<Result<Vec<_>, _>>()?;
    let groups = read_groups(&mut r)?;
    Ok(MulticastRequest {
        host: String::new(),
        port,
        groups,
        known_registrars,
    })
}

fn decode_announcement(packet: &[u8]) -> Result<MulticastAnnouncement, DiscoveryError> {
    let mut r = WireReader::new(packet);
    read_version(&mut r)?;
    let host = r.string()?;
    let port = read_port(&mut r)?;
    let service_id = r.service_id()?;
    let groups = read_groups(&mut r)?;
    Ok(MulticastAnnouncement {
        sequence_number: NO_SEQUENCE_NUMBER,
        host,
        port,
        service_id,
        groups,
    })
}

fn group_items(groups: &[String]) -> Result<Vec<Vec<u8>>, DiscoveryError> {
    groups.iter().map(|g| string_item(g)).collect()
}

fn encode_request(
    request: &MulticastRequest,
    max_packet_size: usize,
    constraints: &InvocationConstraints,
) -> Result<DatagramSet, DiscoveryError> {
    check_v1(constraints, None)?;
    let prefix = u32::from(request.port).to_be_bytes();
    let ids = request
        .known_registrars
        .iter()
        .map(|id| id.to_bytes().to_vec())
        .collect();
    let sections = [ids, group_items(&request.groups)?];
    into_set(&prefix, &sections, max_packet_size)
}

fn encode_announcement(
    announcement: &MulticastAnnouncement,
    max_packet_size: usize,
    constraints: &InvocationConstraints,
) -> Result<DatagramSet, DiscoveryError> {
    check_v1(constraints, None)?;
    let mut prefix = Vec::new();
    put_string(&mut prefix, &announcement.host)?;
    prefix.extend_from_slice(&u32::from(announcement.port).to_be_bytes());
    prefix.extend_from_slice(&announcement.service_id.to_bytes());
    let sections = [group_items(&announcement.groups)?];
    into_set(&prefix, &sections, max_packet_size)
}

fn into_set(
    prefix: &[u8],
    sections: &[Vec<Vec<u8>>],
    max_packet_size: usize,
) -> Result<DatagramSet, DiscoveryError> {
    let mut buffers = DatagramBuffers::new(PROTOCOL_VERSION_1.to_be_bytes().to_vec(), max_packet_size);
    for payload in pack_sections(prefix, sections, CountWidth::U32, buffers.capacity())? {
        buffers.push(&payload)?;
    }
    Ok(DatagramSet {
        format_id: None,
        packets: buffers.into_packets(),
    })
}

impl Discovery for DiscoveryV1 {
    fn protocol_version(&self) -> u32 {
        PROTOCOL_VERSION_1
    }

    fn encode_multicast_request<'a>(
        &'a self,
        request: &'a MulticastRequest,
        max_packet_size: usize,
        constraints: &'a InvocationConstraints,
    ) -> Result<DatagramSets<'a>, DiscoveryError> {
        check_max_packet_size(max_packet_size)?;
        let set = encode_request(request, max_packet_size, constraints);
        Ok(Box::new(std::iter::once(set)))
    }

    fn encode_multicast_announcement<'a>(
        &'a self,
        announcement: &'a MulticastAnnouncement,
        max_packet_size: usize,
        constraints: &'a InvocationConstraints,
    ) -> Result<DatagramSets<'a>, DiscoveryError> {
        check_max_packet_size(max_packet_size)?;
        let set = encode_announcement(announcement, max_packet_size, constraints);
        Ok(Box::new(std::iter::once(set)))
    }

    fn decode_multicast_request(
        &self,
        packet: &[u8],
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
        delay_constraint_check: bool,
    ) -> Result<Decoded<MulticastRequest>, DiscoveryError> {
        let request = decode_request(packet)?;
        if delay_constraint_check {
            let constraints = constraints.clone();
            Ok(Decoded::deferred(request, move || {
                check_v1(&constraints, checker.as_deref()).map(drop)
            }))
        } else {
            check_v1(constraints, checker.as_deref())?;
            Ok(Decoded::checked(request))
        }
    }

    fn decode_multicast_announcement(
        &self,
        packet: &[u8],
        constraints: &InvocationConstraints,
        delay_constraint_check: bool,
    ) -> Result<Decoded<MulticastAnnouncement>, DiscoveryError> {
        let announcement = decode_announcement(packet)?;
        if delay_constraint_check {
            let constraints = constraints.clone();
            Ok(Decoded::deferred(announcement, move || {
                check_v1(&constraints, None).map(drop)
            }))
        } else {
            check_v1(constraints, None)?;
            Ok(Decoded::checked(announcement))
        }
    }

    fn do_unicast_discovery(
        &self,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
    ) -> Result<UnicastExchange, DiscoveryError> {
        let constraints = constraints.make_absolute(SystemTime::now());
        let context = check_v1(&constraints, None)?;
        stream.write_all(&PROTOCOL_VERSION_1.to_be_bytes())?;
        stream.flush()?;
        let response = read_unicast_response(stream)?;
        Ok(UnicastExchange { response, context })
    }

    fn handle_unicast_discovery(
        &self,
        response: &UnicastResponse,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
    ) -> Result<ConnectionContext, DiscoveryError> {
        let constraints = constraints.make_absolute(SystemTime::now());
        let context = check_v1(&constraints, checker.as_deref())?;
        write_unicast_response(stream, response)?;
        Ok(context)
    }
}
