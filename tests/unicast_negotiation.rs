//! Unicast negotiation over loopback TCP, client and server on separate
//! threads.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use discovery_negotiation::prelude::*;

/// Test format: the server replaces the registrar with its own name.
struct Fake(&'static str);

impl FormatProvider for Fake {
    fn format_name(&self) -> &str {
        self.0
    }
}

impl UnicastDiscoveryClient for Fake {
    fn do_unicast_discovery(
        &self,
        stream: &mut dyn ByteStream,
        _constraints: &InvocationConstraints,
        handshake: &Handshake,
    ) -> Result<UnicastResponse, DiscoveryError> {
        if handshake.received.len() != UNICAST_SELECTION_SIZE
            || handshake.sent[..4] != PROTOCOL_VERSION_2.to_be_bytes()
        {
            return Err(DiscoveryError::InvalidArgument("bad handshake".into()));
        }
        read_unicast_response(stream)
    }
}

impl UnicastDiscoveryServer for Fake {
    fn handle_unicast_discovery(
        &self,
        response: &UnicastResponse,
        stream: &mut dyn ByteStream,
        _constraints: &InvocationConstraints,
        _checker: Option<Arc<dyn SubjectChecker>>,
        handshake: &Handshake,
    ) -> Result<(), DiscoveryError> {
        if handshake.sent.len() != UNICAST_SELECTION_SIZE
            || handshake.received[..4] != PROTOCOL_VERSION_2.to_be_bytes()
        {
            return Err(DiscoveryError::InvalidArgument("bad handshake".into()));
        }
        let mut reply = response.clone();
        reply.registrar = self.0.as_bytes().to_vec();
        write_unicast_response(stream, &reply)
    }
}

fn clients(names: &[&'static str]) -> Arc<FormatRegistry> {
    let mut registry = FormatRegistry::new();
    for name in names {
        registry.register_unicast_client(Arc::new(Fake(name)));
    }
    Arc::new(registry)
}

fn servers(names: &[&'static str]) -> Arc<FormatRegistry> {
    let mut registry = FormatRegistry::new();
    for name in names {
        registry.register_unicast_server(Arc::new(Fake(name)));
    }
    Arc::new(registry)
}

type ServerResult = Result<ConnectionContext, DiscoveryError>;
type ClientResult = Result<UnicastExchange, DiscoveryError>;

/// Run one exchange; the server accepts any version the constraints allow.
fn run(
    client_registry: Arc<FormatRegistry>,
    server_registry: Arc<FormatRegistry>,
    client_constraints: InvocationConstraints,
    server_constraints: InvocationConstraints,
) -> (ClientResult, ServerResult) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || -> ServerResult {
        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let response = UnicastResponse::new("lookup.example", 4160, vec![0xab]).with_groups(["public"]);
        accept_unicast(
            &mut stream,
            &server_registry,
            &response,
            &server_constraints,
            None,
        )
    });

    let client = thread::spawn(move || -> ClientResult {
        let negotiated = DiscoveryConstraints::process(&client_constraints)?;
        let mut stream = connect_unicast(addr, &negotiated, SystemTime::now())?;
        let engine = discovery_for_constraints(&negotiated, &client_registry)?;
        engine.do_unicast_discovery(&mut stream, &client_constraints)
    });

    (client.join().unwrap(), server.join().unwrap())
}

#[test]
fn test_first_common_format_selected() {
    let (client, server) = run(
        clients(&["fmt-a", "fmt-b"]),
        servers(&["fmt-b", "fmt-c"]),
        InvocationConstraints::empty(),
        InvocationConstraints::empty(),
    );
    let exchange = client.unwrap();
    let context = server.unwrap();

    let b = FormatId::for_name("fmt-b");
    assert_eq!(exchange.context.format_id(), b);
    assert_eq!(context.format_id(), b);
    assert_eq!(exchange.response.registrar, b"fmt-b");
    assert_eq!(exchange.response.host, "lookup.example");
    assert_eq!(exchange.response.groups, vec!["public".to_string()]);
}

#[test]
fn test_client_order_decides() {
    let (client, server) = run(
        clients(&["fmt-c", "fmt-b"]),
        servers(&["fmt-b", "fmt-c"]),
        InvocationConstraints::empty(),
        InvocationConstraints::empty(),
    );
    assert_eq!(client.unwrap().response.registrar, b"fmt-c");
    assert_eq!(server.unwrap().format_id(), FormatId::for_name("fmt-c"));
}

#[test]
fn test_no_common_format_fails_both_sides() {
    let (client, server) = run(
        clients(&["fmt-a", "fmt-b"]),
        servers(&["fmt-c"]),
        InvocationConstraints::empty(),
        InvocationConstraints::empty(),
    );
    assert_eq!(
        client.unwrap_err().as_protocol(),
        Some(&ProtocolError::NegotiationFailed)
    );
    assert_eq!(
        server.unwrap_err().as_protocol(),
        Some(&ProtocolError::NegotiationFailed)
    );
}

#[test]
fn test_plaintext_end_to_end() {
    let registry = Arc::new(FormatRegistry::with_plaintext());
    let (client, server) = run(
        Arc::clone(&registry),
        registry,
        InvocationConstraints::preferred([InvocationConstraint::Integrity(true)]),
        InvocationConstraints::empty(),
    );
    let exchange = client.unwrap();
    assert_eq!(exchange.response.registrar, vec![0xab]);
    assert_eq!(exchange.context.format_id(), PlaintextFormat::format_id());
    assert_eq!(exchange.context.preferences_satisfied(), 0);
    assert_eq!(server.unwrap().format_name(), PLAINTEXT_FORMAT_NAME);
}

#[test]
fn test_version_one_end_to_end() {
    let registry = Arc::new(FormatRegistry::with_plaintext());
    let v1 = InvocationConstraints::required([InvocationConstraint::ProtocolVersion(1)]);
    let (client, server) = run(
        Arc::clone(&registry),
        registry,
        v1,
        InvocationConstraints::empty(),
    );
    let exchange = client.unwrap();
    assert_eq!(exchange.context.protocol_version(), 1);
    assert_eq!(exchange.response.host, "lookup.example");
    assert_eq!(server.unwrap().protocol_version(), 1);
}

#[test]
fn test_server_rejects_disallowed_version() {
    let registry = Arc::new(FormatRegistry::with_plaintext());
    let (client, server) = run(
        Arc::clone(&registry),
        registry,
        InvocationConstraints::required([InvocationConstraint::ProtocolVersion(1)]),
        InvocationConstraints::required([InvocationConstraint::ProtocolVersion(2)]),
    );
    assert!(server.unwrap_err().is_unsupported());
    // Server closed without replying.
    assert!(matches!(client.unwrap_err(), DiscoveryError::Io(_)));
}

#[test]
fn test_expired_deadline_never_connects() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let now = SystemTime::now();
    let c = InvocationConstraints::required([InvocationConstraint::ConnectionAbsoluteTime(
        now - Duration::from_secs(5),
    )]);
    let negotiated = DiscoveryConstraints::process_at(&c, now).unwrap();
    let err: std::io::Error = connect_unicast(addr, &negotiated, now).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
}
