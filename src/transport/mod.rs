//! Transport adapters.
//!
//! - [`MulticastSocket`]: tokio UDP socket for datagram sets
//! - [`connect_unicast`]: blocking TCP connect applying discovery constraints
//!
//! The engines never open sockets themselves; these adapters are the
//! default way to feed them.

mod socket;
mod unicast;

pub use socket::*;
pub use unicast::*;
