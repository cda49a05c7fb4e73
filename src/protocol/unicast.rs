//! Version 2 unicast format negotiation.
//!
//! Client proposal:
//! ```text
//! +0   Protocol version (4 bytes BE32, = 2)
//! +4   Format count N (2 bytes BE16)
//! +6   N x Format ID (8 bytes BE64 each), client preference order
//! ```
//!
//! Server selection:
//! ```text
//! +0   Protocol version (4 bytes BE32, = 2)
//! +4   Selected format ID (8 bytes BE64), 0 if none matched
//! ```
//!
//! The selected format's provider runs the rest of the exchange.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use super::message::UnicastResponse;
use super::wire::{WireReader, read_u16};
use crate::constraints::{ConnectionContext, InvocationConstraints};
use crate::core::{
    DiscoveryError, FORMAT_ID_SIZE, MAX_PROPOSED_FORMATS, PROTOCOL_VERSION_2, ProtocolError,
    UNICAST_PROPOSAL_HEADER_SIZE, UNICAST_SELECTION_SIZE,
};
use crate::format::{ByteStream, FormatId, FormatProvider, FormatRegistry, Handshake, SubjectChecker};

/// Outcome of a client-side unicast discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastExchange {
    /// What the lookup service sent.
    pub response: UnicastResponse,
    /// Parameters negotiated for the exchange.
    pub context: ConnectionContext,
}

fn context_for<P: FormatProvider + ?Sized>(
    id: FormatId,
    provider: &P,
    constraints: &InvocationConstraints,
) -> Result<ConnectionContext, DiscoveryError> {
    Ok(ConnectionContext::selected(
        id,
        provider.format_name(),
        PROTOCOL_VERSION_2,
        provider.security(),
        constraints,
    )?)
}

pub(crate) fn client_v2(
    registry: &FormatRegistry,
    stream: &mut dyn ByteStream,
    constraints: &InvocationConstraints,
) -> Result<UnicastExchange, DiscoveryError> {
    let constraints = constraints.make_absolute(SystemTime::now());

    let mut proposed = Vec::new();
    let mut last_error = None;
    for (id, client) in registry.unicast_clients() {
        if proposed.len() == MAX_PROPOSED_FORMATS {
            break;
        }
        match client.check_unicast_discovery_constraints(&constraints) {
            Ok(()) => proposed.push(id),
            Err(e) => {
                debug!(%id, format = client.format_name(), error = %e, "format not proposed");
                last_error = Some(e);
            }
        }
    }
    if proposed.is_empty() {
        return Err(last_error.unwrap_or_else(|| ProtocolError::NoSupportedFormats.into()));
    }

    let mut sent = Vec::with_capacity(UNICAST_PROPOSAL_HEADER_SIZE + proposed.len() * FORMAT_ID_SIZE);
    sent.extend_from_slice(&PROTOCOL_VERSION_2.to_be_bytes());
    sent.extend_from_slice(&(proposed.len() as u16).to_be_bytes());
    for id in &proposed {
        sent.extend_from_slice(&id.to_be_bytes());
    }
    stream.write_all(&sent)?;
    stream.flush()?;
    debug!(?proposed, "proposed unicast formats");

    let mut received = [0u8; UNICAST_SELECTION_SIZE];
    stream.read_exact(&mut received)?;
    let mut r = WireReader::new(&received);
    let version = r.u32()?;
    if version != PROTOCOL_VERSION_2 {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION_2,
            actual: version,
        }
        .into());
    }
    let selected = FormatId::from_raw(r.u64()?);
    if selected.is_null() {
        return Err(ProtocolError::NegotiationFailed.into());
    }
    if !proposed.contains(&selected) {
        return Err(ProtocolError::UnexpectedFormat(selected).into());
    }
    let client = registry
        .unicast_client(selected)
        .ok_or(ProtocolError::UnexpectedFormat(selected))?;
    debug!(%selected, format = client.format_name(), "server selected format");

    let context = context_for(selected, &**client, &constraints)?;
    let handshake = Handshake {
        sent,
        received: received.to_vec(),
    };
    let response = client.do_unicast_discovery(stream, &constraints, &handshake)?;
    Ok(UnicastExchange { response, context })
}

/// Server side; the client's protocol version was already read.
pub(crate) fn server_v2(
    registry: &FormatRegistry,
    response: &UnicastResponse,
    stream: &mut dyn ByteStream,
    constraints: &InvocationConstraints,
    checker: Option<Arc<dyn SubjectChecker>>,
) -> Result<ConnectionContext, DiscoveryError> {
    let constraints = constraints.make_absolute(SystemTime::now());

    let count = read_u16(stream)?;
    let mut raw_ids = vec![0u8; count as usize * FORMAT_ID_SIZE];
    stream.read_exact(&mut raw_ids)?;
    let proposed: Vec<FormatId> = raw_ids
        .chunks_exact(FORMAT_ID_SIZE)
        .map(|chunk| {
            let mut bytes = [0u8; FORMAT_ID_SIZE];
            bytes.copy_from_slice(chunk);
            FormatId::from_be_bytes(bytes)
        })
        .collect();
    debug!(?proposed, "client proposed unicast formats");

    let selected = proposed.iter().find_map(|id| {
        let server = registry.unicast_server(*id)?;
        match server.check_unicast_discovery_constraints(&constraints) {
            Ok(()) => Some((*id, server)),
            Err(e) => {
                debug!(%id, format = server.format_name(), error = %e, "format not selected");
                None
            }
        }
    });

    let selected_id = selected.map_or(FormatId::NULL, |(id, _)| id);
    let mut sent = Vec::with_capacity(UNICAST_SELECTION_SIZE);
    sent.extend_from_slice(&PROTOCOL_VERSION_2.to_be_bytes());
    sent.extend_from_slice(&selected_id.to_be_bytes());
    stream.write_all(&sent)?;
    stream.flush()?;

    let Some((id, server)) = selected else {
        debug!("no proposed format acceptable");
        return Err(ProtocolError::NegotiationFailed.into());
    };
    debug!(%id, format = server.format_name(), "selected format");

    let mut received = Vec::with_capacity(UNICAST_PROPOSAL_HEADER_SIZE + raw_ids.len());
    received.extend_from_slice(&PROTOCOL_VERSION_2.to_be_bytes());
    received.extend_from_slice(&count.to_be_bytes());
    received.extend_from_slice(&raw_ids);

    let context = context_for(id, &**server, &constraints)?;
    let handshake = Handshake { sent, received };
    server.handle_unicast_discovery(response, stream, &constraints, checker, &handshake)?;
    Ok(context)
}
