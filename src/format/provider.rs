//! Format provider traits.
//!
//! A provider implements one or more roles for a named wire format. The
//! engine frames each message with the envelope header and delegates the
//! payload to the provider registered for the negotiated format id.

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::constraints::{ConnectionContext, InvocationConstraints, SecurityProperties};
use crate::core::{DiscoveryError, PROTOCOL_VERSION_2};
use crate::protocol::{DatagramBuffers, MulticastAnnouncement, MulticastRequest, UnicastResponse};

use super::FormatId;

/// Duplex byte stream used for unicast discovery.
pub trait ByteStream: Read + Write {}

impl<T: Read + Write + ?Sized> ByteStream for T {}

/// Decides whether a peer's authenticated subject may take part.
pub trait SubjectChecker: Send + Sync {
    /// `principal` is `None` when the format authenticates no one.
    fn check_subject(&self, principal: Option<&str>) -> bool;
}

/// Header bytes already exchanged before a provider takes over.
///
/// Providers that protect the exchange with a MAC or signature cover these
/// bytes too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    /// Bytes this side wrote.
    pub sent: Vec<u8>,
    /// Bytes this side read.
    pub received: Vec<u8>,
}

type PendingCheck = Box<dyn Fn() -> Result<(), DiscoveryError> + Send + Sync>;

/// A decoded message whose constraint check may be deferred.
pub struct Decoded<T> {
    message: T,
    pending: Option<PendingCheck>,
}

impl<T> Decoded<T> {
    /// A message whose constraints were already checked.
    pub fn checked(message: T) -> Self {
        Self {
            message,
            pending: None,
        }
    }

    /// A message with a check to run on demand.
    pub fn deferred(
        message: T,
        check: impl Fn() -> Result<(), DiscoveryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            message,
            pending: Some(Box::new(check)),
        }
    }

    /// The decoded message, checked or not.
    pub fn message(&self) -> &T {
        &self.message
    }

    /// Whether a deferred check is still attached.
    pub fn is_deferred(&self) -> bool {
        self.pending.is_some()
    }

    /// Run the deferred check, if any. May be called repeatedly.
    pub fn check_constraints(&self) -> Result<(), DiscoveryError> {
        match &self.pending {
            Some(check) => check(),
            None => Ok(()),
        }
    }

    /// Run the deferred check and return the message.
    pub fn into_checked(self) -> Result<T, DiscoveryError> {
        self.check_constraints()?;
        Ok(self.message)
    }

    /// Return the message without checking.
    pub fn into_unchecked(self) -> T {
        self.message
    }
}

impl<T: fmt::Debug> fmt::Debug for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoded")
            .field("message", &self.message)
            .field("deferred", &self.pending.is_some())
            .finish()
    }
}

/// Common surface of every provider.
pub trait FormatProvider: Send + Sync {
    /// Human-readable format name; its digest is the format id.
    fn format_name(&self) -> &str;

    /// Security properties connections in this format provide.
    fn security(&self) -> SecurityProperties {
        SecurityProperties::NONE
    }
}

/// Encodes multicast requests.
pub trait MulticastRequestEncoder: FormatProvider {
    /// Push one or more payloads for `request` into `buffers`.
    fn encode_multicast_request(
        &self,
        request: &MulticastRequest,
        buffers: &mut DatagramBuffers,
        constraints: &InvocationConstraints,
    ) -> Result<(), DiscoveryError>;
}

/// Decodes multicast requests.
pub trait MulticastRequestDecoder: FormatProvider {
    /// Decode a payload and check constraints immediately.
    fn decode_multicast_request(
        &self,
        payload: &[u8],
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
    ) -> Result<MulticastRequest, DiscoveryError>;

    /// Decode a payload, leaving the constraint check to the caller.
    ///
    /// Formats whose check is cheap need not override this.
    fn decode_multicast_request_delayed(
        &self,
        payload: &[u8],
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
    ) -> Result<Decoded<MulticastRequest>, DiscoveryError> {
        self.decode_multicast_request(payload, constraints, checker)
            .map(Decoded::checked)
    }
}

/// Encodes multicast announcements.
pub trait MulticastAnnouncementEncoder: FormatProvider {
    /// Push one or more payloads for `announcement` into `buffers`.
    fn encode_multicast_announcement(
        &self,
        announcement: &MulticastAnnouncement,
        buffers: &mut DatagramBuffers,
        constraints: &InvocationConstraints,
    ) -> Result<(), DiscoveryError>;
}

/// Decodes multicast announcements.
pub trait MulticastAnnouncementDecoder: FormatProvider {
    /// Decode a payload and check constraints immediately.
    fn decode_multicast_announcement(
        &self,
        payload: &[u8],
        constraints: &InvocationConstraints,
    ) -> Result<MulticastAnnouncement, DiscoveryError>;

    /// Decode a payload, leaving the constraint check to the caller.
    fn decode_multicast_announcement_delayed(
        &self,
        payload: &[u8],
        constraints: &InvocationConstraints,
    ) -> Result<Decoded<MulticastAnnouncement>, DiscoveryError> {
        self.decode_multicast_announcement(payload, constraints)
            .map(Decoded::checked)
    }
}

/// Client side of unicast discovery in one format.
pub trait UnicastDiscoveryClient: FormatProvider {
    /// Whether this format can satisfy `constraints`. Called before the
    /// format is proposed.
    fn check_unicast_discovery_constraints(
        &self,
        constraints: &InvocationConstraints,
    ) -> Result<(), DiscoveryError> {
        ConnectionContext::establish(
            FormatId::for_name(self.format_name()),
            self.format_name(),
            PROTOCOL_VERSION_2,
            self.security(),
            constraints,
        )?;
        Ok(())
    }

    /// Run the exchange after the format was selected.
    fn do_unicast_discovery(
        &self,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
        handshake: &Handshake,
    ) -> Result<UnicastResponse, DiscoveryError>;
}

/// Server side of unicast discovery in one format.
pub trait UnicastDiscoveryServer: FormatProvider {
    /// Whether this format can satisfy `constraints`. Called before the
    /// format is selected.
    fn check_unicast_discovery_constraints(
        &self,
        constraints: &InvocationConstraints,
    ) -> Result<(), DiscoveryError> {
        ConnectionContext::establish(
            FormatId::for_name(self.format_name()),
            self.format_name(),
            PROTOCOL_VERSION_2,
            self.security(),
            constraints,
        )?;
        Ok(())
    }

    /// Send `response` after the format was selected.
    fn handle_unicast_discovery(
        &self,
        response: &UnicastResponse,
        stream: &mut dyn ByteStream,
        constraints: &InvocationConstraints,
        checker: Option<Arc<dyn SubjectChecker>>,
        handshake: &Handshake,
    ) -> Result<(), DiscoveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProtocolError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_decoded_checked() {
        let decoded = Decoded::checked(5u32);
        assert!(!decoded.is_deferred());
        assert!(decoded.check_constraints().is_ok());
        assert_eq!(decoded.into_checked().unwrap(), 5);
    }

    #[test]
    fn test_decoded_deferred_runs_on_demand() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let decoded = Decoded::deferred("msg", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ProtocolError::NoSupportedFormats.into())
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*decoded.message(), "msg");
        assert!(decoded.check_constraints().is_err());
        assert!(decoded.check_constraints().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(decoded.into_checked().is_err());
    }

    #[test]
    fn test_decoded_unchecked() {
        let decoded = Decoded::deferred(7u8, || Err(DiscoveryError::SecurityDenied("no".into())));
        assert_eq!(decoded.into_unchecked(), 7);
    }
}
