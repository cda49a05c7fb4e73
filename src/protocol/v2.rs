//! Protocol version 2: format-negotiating discovery.
//!
//! Multicast wire format:
//! ```text
//! +0   Protocol version (4 bytes BE32, = 2)
//! +4   Packet type (1 byte: 0 announcement, 1 request)
//! +5   Format ID (8 bytes BE64)
//! +13  Format payload (variable)
//! ```
//!
//! Every registered encoder produces its own set of datagrams; receivers pick
//! the decoder by the format id in the header.

use std::sync::Arc;

use tracing::trace;

use super::Discovery;
use super::datagram::{DatagramBuffers, DatagramSet, DatagramSets};
use super::message::{MulticastAnnouncement, MulticastRequest, UnicastResponse};
use super::unicast::{self, UnicastExchange};
use super::wire::WireReader;
use crate::constraints::{ConnectionContext, InvocationConstraints};
use crate::core::{
    DiscoveryError, MAX_DATAGRAM_SIZE, MIN_MAX_PACKET_SIZE, MULTICAST_HEADER_SIZE,
    PACKET_TYPE_ANNOUNCEMENT, PACKET_TYPE_REQUEST, PROTOCOL_VERSION_2, ProtocolError,
};
use crate::format::{ByteStream, Decoded, FormatId, FormatRegistry, SubjectChecker};

/// Version 2 engine over a shared registry.
#[derive(Debug, Clone)]
pub struct DiscoveryV2 {
    registry: Arc<FormatRegistry>,
}

impl DiscoveryV2 {
    /// Create an engine using the providers in `registry`.
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this engine draws providers from.
    pub fn registry(&self) -> &Arc<FormatRegistry> {
        &self.registry
    }
}

/// Reject packet sizes outside what multicast can carry.
pub(crate) fn check_max_packet_size(max_packet_size: usize) -> Result<(), DiscoveryError> {
    if !(MIN_MAX_PACKET_SIZE..=MAX_DATAGRAM_SIZE).contains(&max_packet_size) {
        return Err(DiscoveryError::InvalidArgument(format!(
            "max packet size {} outside {}..={}",
            max_packet_size, MIN_MAX_PACKET_SIZE, MAX_DATAGRAM_SIZE
        )));
    }
    Ok(())
}

fn multicast_header(packet_type: u8, format_id: FormatId) -> Vec<u8> {
    let mut header = Vec::with_capacity(MULTICAST_HEADER_SIZE);
    header.extend_from_slice(&PROTOCOL_VERSION_2.to_be_bytes());
    header.push(packet_type);
    header.extend_from_slice(&format_id.to_be_bytes());
    header
}

/// Split a datagram into its format id and payload.
fn parse_multicast_header(packet: &[u8], expected_type: u8) -> Result<(FormatId, &[u8]), ProtocolError> {
    let mut r = WireReader::new(packet);
    let version = r.u32()?;
    if version != PROTOCOL_VERSION_2 {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION_2,
            actual: version,
        });
    }
    let packet_type = r.u8()?;
    if packet_type != expected_type {
        return Err(ProtocolError::WrongPacketType {
            expected: expected_type,
            actual: packet_type,
        });
    }
    let format_id = FormatId::from_raw(r.u64()?);
    Ok((format_id, r.rest()))
}

impl Discovery for DiscoveryV2 {
    fn protocol_version(&self) -> u32 {
        PROTOCOL_VERSION_2
    }

    fn encode_multicast_request<'a>(
        &'a self,
        request: &'a MulticastRequest,
        max_packet_size: usize,
        constraints: &'a InvocationConstraints,
    ) -> Result<DatagramSets<'a>, DiscoveryError> {
        check_max_packet_size(max_packet_size)?;
        let sets = self
            .registry
            .multicast_request_encoders()
            .map(move |(id, encoder)| -> Result<DatagramSet, DiscoveryError> {
                let mut buffers =
                    DatagramBuffers::new(multicast_header(PACKET_TYPE_REQUEST, id), max_packet_size);
                encoder.encode_multicast_request(request, &mut buffers, constraints)?;
                trace!(%id, datagrams = buffers.len(), "encoded multicast request");
                Ok(DatagramSet {
                    format_id: Some(id),
                    packets: buffers.into_packets(),
                })
            });
        Ok(Box::new(sets))
    }

    fn encode_multicast_announcement<'a>(
        &'a self,
        announcement: &'a MulticastAnnouncement,
        max_packet_size: usize,
        constraints: &'a InvocationConstraints,
    ) -> Result<DatagramSets<'a>, DiscoveryError> {
        check_max_packet_size(max_packet_size)?;
        let sets = self
            .registry
            .multicast_announcement_encoders()
            .map(move |(id, encoder)| -> Result<DatagramSet, DiscoveryError> {
                let mut buffers = DatagramBuffers::new(
                    multicast_header(PACKET_TYPE_ANNOUNCEMENT, id),
                    max_packet_size,
                );
                encoder.encode_multicast_announcement(announcement, &mut buffers, constraints)?;
                trace!(%id, datagrams = buffers.len(), "encoded multicast announcement");
                Ok(DatagramSet {
                    format_id: Some(id),
                    packets: buffers.into_packets(),
                })
            });
        Ok(Box::new(sets))
    }

    fn decode_multicast_request(
        &self,
        packet: &[u8],
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
        delay_constraint_check: bool,
    ) -> Result<Decoded<MulticastRequest>, DiscoveryError> {
        let (id, payload) = parse_multicast_header(packet, PACKET_TYPE_REQUEST)?;
        let decoder = self
            .registry
            .multicast_request_decoder(id)
            .ok_or(ProtocolError::UnsupportedFormat(id))?;
        if delay_constraint_check {
            decoder.decode_multicast_request_delayed(payload, constraints, checker)
        } else {
            decoder
                .decode_multicast_request(payload, constraints, checker)
                .map(Decoded::checked)
        }
    }

    fn decode_multicast_announcement(
        &self,
        packet: &[u8],
        constraints: &InvocationConstraints,
        delay_constraint_check: bool,
    ) -> Result<Decoded<MulticastAnnouncement>, DiscoveryError> {
        let (id, payload) = parse_multicast_header(packet, PACKET_TYPE_ANNOUNCEMENT)?;
        let decoder = self
            .registry
            .multicast_announcement_decoder(id)
            .ok_or(ProtocolError::UnsupportedFormat(id))?;
        if delay_constraint_check {
            decoder.decode_multicast_announcement_delayed(payload, constraints)
        } else {
            decoder
                .decode_multicast_announcement(payload, constraints)
                .map(Decoded::checked)
        }
    }

    fn do_unicast_discovery(
        &self,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
    ) -> Result<UnicastExchange, DiscoveryError> {
        unicast::client_v2(&self.registry, stream, constraints)
    }

    fn handle_unicast_discovery(
        &self,
        response: &UnicastResponse,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
    ) -> Result<ConnectionContext, DiscoveryError> {
        unicast::server_v2(&self.registry, response, stream, constraints, checker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PLAINTEXT_FORMAT_NAME;
    use crate::format::{
        FormatProvider, MulticastRequestDecoder, MulticastRequestEncoder, PlaintextFormat,
    };
    use crate::protocol::ServiceId;

    /// Fixed codec: the payload is the port followed by the host bytes.
    struct Fake(&'static str);

    impl FormatProvider for Fake {
        fn format_name(&self) -> &str {
            self.0
        }
    }

    impl MulticastRequestEncoder for Fake {
        fn encode_multicast_request(
            &self,
            request: &MulticastRequest,
            buffers: &mut DatagramBuffers,
            _constraints: &InvocationConstraints,
        ) -> Result<(), DiscoveryError> {
            let mut payload = request.port.to_be_bytes().to_vec();
            payload.extend_from_slice(request.host.as_bytes());
            buffers.push(&payload)
        }
    }

    impl MulticastRequestDecoder for Fake {
        fn decode_multicast_request(
            &self,
            payload: &[u8],
            _constraints: &InvocationConstraints,
            _checker: Option<Arc<dyn SubjectChecker>>,
        ) -> Result<MulticastRequest, DiscoveryError> {
            let mut r = WireReader::new(payload);
            let port = r.u16()?;
            let host = String::from_utf8(r.rest().to_vec())
                .map_err(|_| ProtocolError::Malformed("host".into()))?;
            Ok(MulticastRequest::new(host, port))
        }
    }

    fn fake_engine(names: &[&'static str]) -> DiscoveryV2 {
        let mut registry = FormatRegistry::new();
        for name in names {
            let fake = Arc::new(Fake(name));
            registry.register_multicast_request_encoder(fake.clone());
            registry.register_multicast_request_decoder(fake);
        }
        DiscoveryV2::new(Arc::new(registry))
    }

    #[test]
    fn test_header_layout() {
        let engine = fake_engine(&["fake-a"]);
        let request = MulticastRequest::new("h", 0x0102);
        let constraints = InvocationConstraints::empty();
        let sets: Vec<_> = engine
            .encode_multicast_request(&request, 512, &constraints)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(sets.len(), 1);

        let id = FormatId::for_name("fake-a");
        let mut expected = hex::decode("0000000201").unwrap();
        expected.extend_from_slice(&id.to_be_bytes());
        expected.extend_from_slice(&[0x01, 0x02, b'h']);
        assert_eq!(sets[0].format_id, Some(id));
        assert_eq!(sets[0].packets, vec![expected]);
    }

    #[test]
    fn test_one_set_per_encoder_in_order() {
        let engine = fake_engine(&["fake-a", "fake-b", "fake-c"]);
        let request = MulticastRequest::new("host", 80);
        let constraints = InvocationConstraints::empty();
        let ids: Vec<_> = engine
            .encode_multicast_request(&request, 512, &constraints)
            .unwrap()
            .map(|set| set.unwrap().format_id.unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![
                FormatId::for_name("fake-a"),
                FormatId::for_name("fake-b"),
                FormatId::for_name("fake-c")
            ]
        );
    }

    #[test]
    fn test_fake_codec_round_trip() {
        let engine = fake_engine(&["fake-a"]);
        let request = MulticastRequest::new("client", 4160);
        let constraints = InvocationConstraints::empty();
        let set = engine
            .encode_multicast_request(&request, 512, &constraints)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let decoded = engine
            .decode_multicast_request(&set.packets[0], &constraints, None, false)
            .unwrap();
        assert_eq!(decoded.into_checked().unwrap(), request);
    }

    #[test]
    fn test_max_packet_size_bounds() {
        let engine = fake_engine(&["fake-a"]);
        let request = MulticastRequest::new("h", 1);
        let constraints = InvocationConstraints::empty();
        assert!(matches!(
            engine.encode_multicast_request(&request, 511, &constraints),
            Err(DiscoveryError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.encode_multicast_request(&request, MAX_DATAGRAM_SIZE + 1, &constraints),
            Err(DiscoveryError::InvalidArgument(_))
        ));
        assert!(engine.encode_multicast_request(&request, 512, &constraints).is_ok());
    }

    #[test]
    fn test_decode_rejects_bad_headers() {
        let engine = fake_engine(&["fake-a"]);
        let constraints = InvocationConstraints::empty();
        let id = FormatId::for_name("fake-a");

        let mut wrong_version = hex::decode("0000000101").unwrap();
        wrong_version.extend_from_slice(&id.to_be_bytes());
        let err = engine
            .decode_multicast_request(&wrong_version, &constraints, None, false)
            .unwrap_err();
        assert_eq!(
            err.as_protocol(),
            Some(&ProtocolError::VersionMismatch {
                expected: 2,
                actual: 1
            })
        );

        let mut announcement = hex::decode("0000000200").unwrap();
        announcement.extend_from_slice(&id.to_be_bytes());
        let err = engine
            .decode_multicast_request(&announcement, &constraints, None, false)
            .unwrap_err();
        assert_eq!(
            err.as_protocol(),
            Some(&ProtocolError::WrongPacketType {
                expected: PACKET_TYPE_REQUEST,
                actual: PACKET_TYPE_ANNOUNCEMENT
            })
        );

        let err = engine
            .decode_multicast_request(&[0, 0, 0, 2, 1], &constraints, None, false)
            .unwrap_err();
        assert!(matches!(err.as_protocol(), Some(ProtocolError::TooShort { .. })));
    }

    #[test]
    fn test_decode_unknown_format() {
        let engine = fake_engine(&["fake-a"]);
        let unknown = FormatId::for_name("fake-z");
        let mut packet = hex::decode("0000000201").unwrap();
        packet.extend_from_slice(&unknown.to_be_bytes());
        let err = engine
            .decode_multicast_request(&packet, &InvocationConstraints::empty(), None, false)
            .unwrap_err();
        assert_eq!(err.as_protocol(), Some(&ProtocolError::UnsupportedFormat(unknown)));
    }

    #[test]
    fn test_plaintext_announcement_round_trip() {
        let engine = DiscoveryV2::new(Arc::new(FormatRegistry::with_plaintext()));
        let announcement = MulticastAnnouncement::new(42, "lookup.example", 4160, ServiceId::new(7, 8))
            .with_groups(["public", "lab"]);
        let constraints = InvocationConstraints::empty();
        let sets: Vec<_> = engine
            .encode_multicast_announcement(&announcement, 512, &constraints)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].format_id, Some(PlaintextFormat::format_id()));
        assert_eq!(sets[0].packets[0][4], PACKET_TYPE_ANNOUNCEMENT);

        let decoded = engine
            .decode_multicast_announcement(&sets[0].packets[0], &constraints, true)
            .unwrap();
        assert!(decoded.is_deferred());
        assert_eq!(decoded.into_checked().unwrap(), announcement);
        assert_eq!(FormatId::for_name(PLAINTEXT_FORMAT_NAME), PlaintextFormat::format_id());
    }

    #[test]
    fn test_encoder_failure_is_per_set() {
        let engine = DiscoveryV2::new(Arc::new(FormatRegistry::with_plaintext()));
        let request = MulticastRequest::new("h", 1);
        let integrity = InvocationConstraints::required([
            crate::constraints::InvocationConstraint::Integrity(true),
        ]);
        let mut sets = engine.encode_multicast_request(&request, 512, &integrity).unwrap();
        assert!(sets.next().unwrap().unwrap_err().is_unsupported());
        assert!(sets.next().is_none());
    }
}
