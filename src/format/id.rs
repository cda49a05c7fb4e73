//! Stable format identifiers.
//!
//! A format id is the first eight bytes of the SHA-1 digest of the format's
//! UTF-8 name, read big-endian. Independent peers derive the same id from
//! the same name without coordination.

use std::fmt;

use sha1::{Digest, Sha1};

use crate::core::NULL_FORMAT_ID;

/// 64-bit identifier of a named wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatId(u64);

impl FormatId {
    /// Reserved id meaning "no format could be agreed".
    pub const NULL: Self = Self(NULL_FORMAT_ID);

    /// Compute the id of a format name.
    pub fn for_name(name: &str) -> Self {
        let digest = Sha1::digest(name.as_bytes());
        let mut high = [0u8; 8];
        high.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(high))
    }

    /// Wrap a raw id read from the wire.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this is the reserved "none" id.
    pub const fn is_null(self) -> bool {
        self.0 == NULL_FORMAT_ID
    }

    /// Big-endian wire encoding.
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode from big-endian wire bytes.
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<FormatId> for u64 {
    fn from(id: FormatId) -> u64 {
        id.0
    }
}
