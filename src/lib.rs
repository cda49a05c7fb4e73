//! # Discovery Negotiation
//!
//! Constraint-driven negotiation for lookup-service discovery. Callers state
//! what they require and prefer as invocation constraints; this crate
//! reduces them to concrete protocol parameters and runs the multicast and
//! unicast discovery exchanges with whichever wire format both peers accept.
//!
//! ## Layers
//!
//! - [`constraints`]: constraint model, reduction, [`DiscoveryConstraints`]
//! - [`format`]: format ids, provider traits, [`FormatRegistry`]
//! - [`protocol`]: version 1 and version 2 engines
//! - [`config`]: JSON configuration
//! - [`transport`]: sockets (requires `transport` feature)
//!
//! ## Feature Flags
//!
//! - `transport` (default): tokio multicast socket and TCP connect helper
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use discovery_negotiation::prelude::*;
//!
//! let constraints = InvocationConstraints::new(
//!     [InvocationConstraint::TimeToLive(4)],
//!     [InvocationConstraint::SocketTimeout(Duration::from_secs(5))],
//! );
//! let negotiated = DiscoveryConstraints::process(&constraints)?;
//! assert_eq!(negotiated.choose_protocol_version(), 2);
//! assert_eq!(negotiated.time_to_live(DEFAULT_TIME_TO_LIVE), 4);
//!
//! let registry = Arc::new(FormatRegistry::with_plaintext());
//! let engine = discovery_for_constraints(&negotiated, &registry)?;
//! let request = MulticastRequest::new("10.0.0.5", 4160).with_groups(["public"]);
//! let max_packet_size = negotiated.max_packet_size(DEFAULT_MAX_PACKET_SIZE);
//! for set in engine.encode_multicast_request(&request, max_packet_size, &constraints)? {
//!     let set = set?;
//!     assert_eq!(set.format_id, Some(PlaintextFormat::format_id()));
//! }
//! # Ok::<(), DiscoveryError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Constants and errors (always included)
pub mod core;

pub mod config;
pub mod constraints;
pub mod format;
pub mod protocol;

// Transport adapters (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::DiscoveryConfig;
    pub use crate::constraints::*;
    pub use crate::core::*;
    pub use crate::format::*;
    pub use crate::protocol::*;

    #[cfg(feature = "transport")]
    pub use crate::transport::{MulticastSocket, MulticastSocketBuilder, connect_unicast};
}

// Re-export commonly used items at crate root
pub use config::DiscoveryConfig;
pub use constraints::{DiscoveryConstraints, InvocationConstraint, InvocationConstraints};
pub use core::{DiscoveryError, ProtocolError, UnsupportedConstraintError};
pub use format::{FormatId, FormatRegistry};
pub use protocol::{Discovery, DiscoveryV1, DiscoveryV2, discovery_for};
