//! Big-endian field encoding shared by the discovery codecs.
//!
//! Strings are a 16-bit length followed by UTF-8 bytes.

use std::io::Read;

use crate::core::{DiscoveryError, ProtocolError, SERVICE_ID_SIZE};

use super::message::ServiceId;

/// Cursor over a received buffer.
#[derive(Debug)]
pub(crate) struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(ProtocolError::TooShort {
                expected: self.pos.saturating_add(len),
                actual: self.data.len(),
            });
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub(crate) fn string(&mut self) -> Result<String, ProtocolError> {
        let len = self.u16()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| ProtocolError::Malformed("string is not valid UTF-8".into()))
    }

    pub(crate) fn service_id(&mut self) -> Result<ServiceId, ProtocolError> {
        Ok(ServiceId::from_bytes(self.array::<SERVICE_ID_SIZE>()?))
    }

    /// Everything not yet consumed.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Fail if unconsumed bytes remain.
    pub(crate) fn finish(&self) -> Result<(), ProtocolError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::Malformed(format!(
                "{} trailing bytes",
                self.data.len() - self.pos
            )))
        }
    }
}

/// Append a length-prefixed string.
pub(crate) fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<(), DiscoveryError> {
    let len = u16::try_from(s.len()).map_err(|_| {
        DiscoveryError::InvalidArgument(format!("string of {} bytes is too long", s.len()))
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Encode a string as a standalone item.
pub(crate) fn string_item(s: &str) -> Result<Vec<u8>, DiscoveryError> {
    let mut buf = Vec::with_capacity(2 + s.len());
    put_string(&mut buf, s)?;
    Ok(buf)
}

pub(crate) fn read_u16(r: &mut (impl Read + ?Sized)) -> Result<u16, DiscoveryError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub(crate) fn read_u32(r: &mut (impl Read + ?Sized)) -> Result<u32, DiscoveryError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub(crate) fn read_string(r: &mut (impl Read + ?Sized)) -> Result<String, DiscoveryError> {
    let len = read_u16(r)? as usize;
    let mut raw = vec![0u8; len];
    r.read_exact(&mut raw)?;
    String::from_utf8(raw)
        .map_err(|_| ProtocolError::Malformed("string is not valid UTF-8".into()).into())
}
