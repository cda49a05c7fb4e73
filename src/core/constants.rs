//! Protocol constants for discovery.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed.

use std::net::Ipv4Addr;
use std::time::Duration;

// =============================================================================
// PROTOCOL VERSIONS
// =============================================================================

/// Discovery protocol version 1 (fixed encoding, no format negotiation).
pub const PROTOCOL_VERSION_1: u32 = 1;

/// Discovery protocol version 2 (format-negotiating).
pub const PROTOCOL_VERSION_2: u32 = 2;

/// Versions this implementation can speak.
pub const SUPPORTED_PROTOCOL_VERSIONS: [u32; 2] = [PROTOCOL_VERSION_1, PROTOCOL_VERSION_2];

/// Version chosen when nothing disambiguates among acceptable versions.
pub const BIAS_PROTOCOL_VERSION: u32 = PROTOCOL_VERSION_2;

// =============================================================================
// MULTICAST PACKET TYPES
// =============================================================================

/// Multicast announcement packet.
pub const PACKET_TYPE_ANNOUNCEMENT: u8 = 0;

/// Multicast request packet.
pub const PACKET_TYPE_REQUEST: u8 = 1;

// =============================================================================
// HEADER SIZES
// =============================================================================

/// Multicast header (version + packet type + format id).
pub const MULTICAST_HEADER_SIZE: usize = 4 + 1 + 8;

/// Fixed part of the unicast client proposal (version + format count).
pub const UNICAST_PROPOSAL_HEADER_SIZE: usize = 4 + 2;

/// Unicast server selection (version + selected format id).
pub const UNICAST_SELECTION_SIZE: usize = 4 + 8;

/// Size of one format id on the wire.
pub const FORMAT_ID_SIZE: usize = 8;

/// Size of a service id on the wire.
pub const SERVICE_ID_SIZE: usize = 16;

// =============================================================================
// LIMITS
// =============================================================================

/// Reserved format id meaning "no format could be agreed".
pub const NULL_FORMAT_ID: u64 = 0;

/// Maximum number of format ids in one unicast proposal.
pub const MAX_PROPOSED_FORMATS: usize = u16::MAX as usize;

/// Smallest max packet size a caller may request for multicast encoding.
pub const MIN_MAX_PACKET_SIZE: usize = 512;

/// Default max packet size for multicast encoding.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 512;

/// Largest UDP payload.
pub const MAX_DATAGRAM_SIZE: usize = 65507;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Default multicast time to live.
pub const DEFAULT_TIME_TO_LIVE: u8 = 15;

/// Default unicast socket timeout.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(60);

/// Well-known discovery port.
pub const DISCOVERY_PORT: u16 = 4160;

/// Multicast group for discovery requests.
pub const REQUEST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 85);

/// Multicast group for discovery announcements.
pub const ANNOUNCEMENT_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 84);

/// Name of the built-in plaintext format.
pub const PLAINTEXT_FORMAT_NAME: &str = "net.jini.discovery.plaintext";
