//! Built-in plaintext format: no integrity, no confidentiality, no
//! authentication.

use std::io::{Read, Write};
use std::sync::Arc;

use super::id::FormatId;
use super::provider::{
    ByteStream, Decoded, FormatProvider, Handshake, MulticastAnnouncementDecoder,
    MulticastAnnouncementEncoder, MulticastRequestDecoder, MulticastRequestEncoder,
    SubjectChecker, UnicastDiscoveryClient, UnicastDiscoveryServer,
};
use crate::constraints::{ConnectionContext, InvocationConstraints, SecurityProperties};
use crate::core::{DiscoveryError, PLAINTEXT_FORMAT_NAME, PROTOCOL_VERSION_2, ProtocolError};
use crate::protocol::wire::{WireReader, put_string, read_string, read_u16, read_u32, string_item};
use crate::protocol::{
    CountWidth, DatagramBuffers, MulticastAnnouncement, MulticastRequest, UnicastResponse,
    pack_sections,
};

/// Upper bound on a registrar proxy read from the wire.
const MAX_REGISTRAR_SIZE: usize = 16 * 1024 * 1024;

/// The `net.jini.discovery.plaintext` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextFormat;

impl PlaintextFormat {
    /// Create the provider.
    pub fn new() -> Self {
        Self
    }

    /// Format id of the plaintext format.
    pub fn format_id() -> FormatId {
        FormatId::for_name(PLAINTEXT_FORMAT_NAME)
    }
}

/// Check `constraints` for an unsecured exchange, then ask `checker` about
/// the (absent) peer subject.
pub(crate) fn check_unsecured(
    format_id: FormatId,
    format_name: &str,
    version: u32,
    constraints: &InvocationConstraints,
    checker: Option<&dyn SubjectChecker>,
) -> Result<ConnectionContext, DiscoveryError> {
    let context = ConnectionContext::establish(
        format_id,
        format_name,
        version,
        SecurityProperties::NONE,
        constraints,
    )?;
    match checker {
        Some(checker) if !checker.check_subject(None) => Err(DiscoveryError::SecurityDenied(
            "unauthenticated peer rejected by subject checker".into(),
        )),
        _ => Ok(context),
    }
}

fn check_plaintext(
    constraints: &InvocationConstraints,
    checker: Option<&dyn SubjectChecker>,
) -> Result<(), DiscoveryError> {
    check_unsecured(
        PlaintextFormat::format_id(),
        PLAINTEXT_FORMAT_NAME,
        PROTOCOL_VERSION_2,
        constraints,
        checker,
    )?;
    Ok(())
}

fn group_items(groups: &[String]) -> Result<Vec<Vec<u8>>, DiscoveryError> {
    groups.iter().map(|g| string_item(g)).collect()
}

fn read_groups(r: &mut WireReader<'_>) -> Result<Vec<String>, ProtocolError> {
    let n = r.u16()?;
    (0..n).map(|_| r.string()).collect()
}

fn decode_request(payload: &[u8]) -> Result<MulticastRequest, DiscoveryError> {
    let mut r = WireReader::new(payload);
    let host = r.string()?;
    let port = r.u16()?;
    let groups = read_groups(&mut r)?;
    let count = r.u16()?;
    let known_registrars = (0..count)
        .map(|_| r.service_id())
        .collect::<Result<Vec<_>, _>>()?;
    r.finish()?;
    Ok(MulticastRequest {
        host,
        port,
        groups,
        known_registrars,
    })
}

fn decode_announcement(payload: &[u8]) -> Result<MulticastAnnouncement, DiscoveryError> {
    let mut r = WireReader::new(payload);
    let sequence_number = r.u64()?;
    let host = r.string()?;
    let port = r.u16()?;
    let service_id = r.service_id()?;
    let groups = read_groups(&mut r)?;
    r.finish()?;
    Ok(MulticastAnnouncement {
        sequence_number,
        host,
        port,
        service_id,
        groups,
    })
}

/// Write a unicast response body.
pub fn write_unicast_response(
    w: &mut (impl Write + ?Sized),
    response: &UnicastResponse,
) -> Result<(), DiscoveryError> {
    let group_count = u16::try_from(response.groups.len()).map_err(|_| {
        DiscoveryError::InvalidArgument(format!("{} groups is too many", response.groups.len()))
    })?;
    let registrar_len = u32::try_from(response.registrar.len()).map_err(|_| {
        DiscoveryError::InvalidArgument("registrar proxy too large".into())
    })?;

    let mut buf = Vec::new();
    put_string(&mut buf, &response.host)?;
    buf.extend_from_slice(&response.port.to_be_bytes());
    buf.extend_from_slice(&group_count.to_be_bytes());
    for group in &response.groups {
        put_string(&mut buf, group)?;
    }
    buf.extend_from_slice(&registrar_len.to_be_bytes());
    buf.extend_from_slice(&response.registrar);

    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

/// Read a unicast response body.
pub fn read_unicast_response(r: &mut (impl Read + ?Sized)) -> Result<UnicastResponse, DiscoveryError> {
    let host = read_string(r)?;
    let port = read_u16(r)?;
    let group_count = read_u16(r)?;
    let groups = (0..group_count)
        .map(|_| read_string(r))
        .collect::<Result<Vec<_>, _>>()?;

    let len = read_u32(r)? as usize;
    if len > MAX_REGISTRAR_SIZE {
        return Err(ProtocolError::Malformed(format!(
            "registrar proxy of {} bytes exceeds limit of {}",
            len, MAX_REGISTRAR_SIZE
        ))
        .into());
    }
    let mut registrar = vec![0u8; len];
    r.read_exact(&mut registrar)?;

    Ok(UnicastResponse {
        host,
        port,
        groups,
        registrar,
    })
}

impl FormatProvider for PlaintextFormat {
    fn format_name(&self) -> &str {
        PLAINTEXT_FORMAT_NAME
    }
}

impl MulticastRequestEncoder for PlaintextFormat {
    fn encode_multicast_request(
        &self,
        request: &MulticastRequest,
        buffers: &mut DatagramBuffers,
        constraints: &InvocationConstraints,
    ) -> Result<(), DiscoveryError> {
        check_plaintext(constraints, None)?;

        let mut prefix = Vec::new();
        put_string(&mut prefix, &request.host)?;
        prefix.extend_from_slice(&request.port.to_be_bytes());

        let ids = request
            .known_registrars
            .iter()
            .map(|id| id.to_bytes().to_vec())
            .collect();
        let sections = [group_items(&request.groups)?, ids];

        for payload in pack_sections(&prefix, &sections, CountWidth::U16, buffers.capacity())? {
            buffers.push(&payload)?;
        }
        Ok(())
    }
}

impl MulticastRequestDecoder for PlaintextFormat {
    fn decode_multicast_request(
        &self,
        payload: &[u8],
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
    ) -> Result<MulticastRequest, DiscoveryError> {
        let request = decode_request(payload)?;
        check_plaintext(constraints, checker.as_deref())?;
        Ok(request)
    }

    fn decode_multicast_request_delayed(
        &self,
        payload: &[u8],
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
    ) -> Result<Decoded<MulticastRequest>, DiscoveryError> {
        let request = decode_request(payload)?;
        let constraints = constraints.clone();
        Ok(Decoded::deferred(request, move || {
            check_plaintext(&constraints, checker.as_deref())
        }))
    }
}

impl MulticastAnnouncementEncoder for PlaintextFormat {
    fn encode_multicast_announcement(
        &self,
        announcement: &MulticastAnnouncement,
        buffers: &mut DatagramBuffers,
        constraints: &InvocationConstraints,
    ) -> Result<(), DiscoveryError> {
        check_plaintext(constraints, None)?;

        let mut prefix = Vec::new();
        prefix.extend_from_slice(&announcement.sequence_number.to_be_bytes());
        put_string(&mut prefix, &announcement.host)?;
        prefix.extend_from_slice(&announcement.port.to_be_bytes());
        prefix.extend_from_slice(&announcement.service_id.to_bytes());

        let sections = [group_items(&announcement.groups)?];
        for payload in pack_sections(&prefix, &sections, CountWidth::U16, buffers.capacity())? {
            buffers.push(&payload)?;
        }
        Ok(())
    }
}

impl MulticastAnnouncementDecoder for PlaintextFormat {
    fn decode_multicast_announcement(
        &self,
        payload: &[u8],
        constraints: &InvocationConstraints,
    ) -> Result<MulticastAnnouncement, DiscoveryError> {
        let announcement = decode_announcement(payload)?;
        check_plaintext(constraints, None)?;
        Ok(announcement)
    }

    fn decode_multicast_announcement_delayed(
        &self,
        payload: &[u8],
        constraints: &InvocationConstraints,
    ) -> Result<Decoded<MulticastAnnouncement>, DiscoveryError> {
        let announcement = decode_announcement(payload)?;
        let constraints = constraints.clone();
        Ok(Decoded::deferred(announcement, move || {
            check_plaintext(&constraints, None)
        }))
    }
}

impl UnicastDiscoveryClient for PlaintextFormat {
    fn do_unicast_discovery(
        &self,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
        _handshake: &Handshake,
    ) -> Result<UnicastResponse, DiscoveryError> {
        check_plaintext(constraints, None)?;
        read_unicast_response(stream)
    }
}

impl UnicastDiscoveryServer for PlaintextFormat {
    fn handle_unicast_discovery(
        &self,
        response: &UnicastResponse,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
        _handshake: &Handshake,
    ) -> Result<(), DiscoveryError> {
        check_plaintext(constraints, checker.as_deref())?;
        write_unicast_response(stream, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::InvocationConstraint;
    use crate::protocol::ServiceId;
    use std::io::Cursor;

    struct Deny;

    impl SubjectChecker for Deny {
        fn check_subject(&self, _principal: Option<&str>) -> bool {
            false
        }
    }

    fn buffers(max: usize) -> DatagramBuffers {
        DatagramBuffers::new(vec![0xee; 13], max)
    }

    #[test]
    fn test_format_id() {
        assert_eq!(PlaintextFormat::format_id().as_u64(), 0x760f15cb7490ce36);
    }

    #[test]
    fn test_request_payload_layout() {
        let request = MulticastRequest::new("h", 7)
            .with_groups(["g"])
            .with_known_registrars([ServiceId::new(0, 1)]);
        let mut bufs = buffers(512);
        PlaintextFormat
            .encode_multicast_request(&request, &mut bufs, &InvocationConstraints::empty())
            .unwrap();
        let packets = bufs.into_packets();
        assert_eq!(packets.len(), 1);

        let payload = &packets[0][13..];
        let mut expected = hex::decode("00016800070001000167").unwrap();
        expected.extend_from_slice(&[0, 1]);
        expected.extend_from_slice(&ServiceId::new(0, 1).to_bytes());
        assert_eq!(payload, expected.as_slice());

        let decoded = PlaintextFormat
            .decode_multicast_request(payload, &InvocationConstraints::empty(), None)
            .unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_request_splits_groups() {
        let groups: Vec<String> = (0..60).map(|i| format!("group-{:02}-padding", i)).collect();
        let request = MulticastRequest::new("client.example", 4160).with_groups(groups.clone());
        let mut bufs = buffers(512);
        PlaintextFormat
            .encode_multicast_request(&request, &mut bufs, &InvocationConstraints::empty())
            .unwrap();
        let packets = bufs.into_packets();
        assert!(packets.len() > 1);

        let mut seen = Vec::new();
        for packet in &packets {
            assert!(packet.len() <= 512);
            let part = decode_request(&packet[13..]).unwrap();
            assert_eq!(part.host, "client.example");
            assert_eq!(part.port, 4160);
            seen.extend(part.groups);
        }
        assert_eq!(seen, groups);
    }

    #[test]
    fn test_announcement_decode() {
        let announcement = MulticastAnnouncement::new(9, "lookup", 4160, ServiceId::new(3, 4))
            .with_groups(["public"]);
        let mut bufs = buffers(512);
        PlaintextFormat
            .encode_multicast_announcement(&announcement, &mut bufs, &InvocationConstraints::empty())
            .unwrap();
        let packets = bufs.into_packets();
        let decoded = PlaintextFormat
            .decode_multicast_announcement(&packets[0][13..], &InvocationConstraints::empty())
            .unwrap();
        assert_eq!(decoded, announcement);
    }

    #[test]
    fn test_truncated_payload() {
        let result = PlaintextFormat.decode_multicast_request(
            &[0x00, 0x05, b'a'],
            &InvocationConstraints::empty(),
            None,
        );
        assert!(matches!(
            result,
            Err(DiscoveryError::Protocol(ProtocolError::TooShort { .. }))
        ));
    }

    #[test]
    fn test_checker_denial() {
        let request = MulticastRequest::new("h", 1);
        let mut bufs = buffers(512);
        PlaintextFormat
            .encode_multicast_request(&request, &mut bufs, &InvocationConstraints::empty())
            .unwrap();
        let packet = bufs.into_packets().remove(0);

        let result = PlaintextFormat.decode_multicast_request(
            &packet[13..],
            &InvocationConstraints::empty(),
            Some(Arc::new(Deny)),
        );
        assert!(matches!(result, Err(DiscoveryError::SecurityDenied(_))));
    }

    #[test]
    fn test_delayed_check() {
        let request = MulticastRequest::new("h", 1);
        let mut bufs = buffers(512);
        PlaintextFormat
            .encode_multicast_request(&request, &mut bufs, &InvocationConstraints::empty())
            .unwrap();
        let packet = bufs.into_packets().remove(0);

        let integrity = InvocationConstraints::required([InvocationConstraint::Integrity(true)]);
        assert!(
            PlaintextFormat
                .decode_multicast_request(&packet[13..], &integrity, None)
                .is_err()
        );

        let decoded = PlaintextFormat
            .decode_multicast_request_delayed(&packet[13..], &integrity, None)
            .unwrap();
        assert!(decoded.is_deferred());
        assert_eq!(decoded.message().host, "h");
        assert!(matches!(
            decoded.check_constraints(),
            Err(DiscoveryError::Unsupported(_))
        ));
    }

    #[test]
    fn test_requires_integrity_fails_encode() {
        let c = InvocationConstraints::required([InvocationConstraint::Integrity(true)]);
        let mut bufs = buffers(512);
        let result = PlaintextFormat.encode_multicast_request(&MulticastRequest::new("h", 1), &mut bufs, &c);
        assert!(result.unwrap_err().is_unsupported());
        assert!(bufs.is_empty());
    }

    #[test]
    fn test_unicast_response_body() {
        let response = UnicastResponse::new("lookup", 4160, vec![0xca, 0xfe]).with_groups(["a", "b"]);
        let mut out = Vec::new();
        write_unicast_response(&mut out, &response).unwrap();
        assert_eq!(
            hex::encode(&out),
            "00066c6f6f6b75701040000200016100016200000002cafe"
        );
        let decoded = read_unicast_response(&mut Cursor::new(out)).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_unicast_response_registrar_limit() {
        let mut buf = Vec::new();
        put_string(&mut buf, "h").unwrap();
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&u32::MAX.to_be_bytes());
        let result = read_unicast_response(&mut Cursor::new(buf));
        assert!(matches!(
            result,
            Err(DiscoveryError::Protocol(ProtocolError::Malformed(_)))
        ));
    }
}
