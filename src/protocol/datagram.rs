//! Multicast datagram assembly.

use crate::core::DiscoveryError;
use crate::format::FormatId;

/// Datagrams produced for one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramSet {
    /// Format the datagrams were encoded with; `None` for version 1.
    pub format_id: Option<FormatId>,
    /// Complete datagrams, header included.
    pub packets: Vec<Vec<u8>>,
}

impl DatagramSet {
    /// Number of datagrams.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether the set holds no datagrams.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

/// Lazy sequence of datagram sets, one per encoder format.
pub type DatagramSets<'a> = Box<dyn Iterator<Item = Result<DatagramSet, DiscoveryError>> + 'a>;

/// Output buffers handed to a multicast encoder.
///
/// Every datagram starts with the same envelope header; the encoder pushes
/// payloads no larger than [`capacity`](Self::capacity).
#[derive(Debug)]
pub struct DatagramBuffers {
    header: Vec<u8>,
    max_packet_size: usize,
    packets: Vec<Vec<u8>>,
}

impl DatagramBuffers {
    pub(crate) fn new(header: Vec<u8>, max_packet_size: usize) -> Self {
        Self {
            header,
            max_packet_size,
            packets: Vec::new(),
        }
    }

    /// Largest payload a single datagram can carry.
    pub fn capacity(&self) -> usize {
        self.max_packet_size.saturating_sub(self.header.len())
    }

    /// Append a datagram carrying `payload`.
    pub fn push(&mut self, payload: &[u8]) -> Result<(), DiscoveryError> {
        if payload.len() > self.capacity() {
            return Err(DiscoveryError::InvalidArgument(format!(
                "payload of {} bytes exceeds datagram capacity of {}",
                payload.len(),
                self.capacity()
            )));
        }
        let mut packet = Vec::with_capacity(self.header.len() + payload.len());
        packet.extend_from_slice(&self.header);
        packet.extend_from_slice(payload);
        self.packets.push(packet);
        Ok(())
    }

    /// Number of datagrams pushed so far.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether nothing was pushed.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub(crate) fn into_packets(self) -> Vec<Vec<u8>> {
        self.packets
    }
}

/// Width of the per-section item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CountWidth {
    U16,
    U32,
}

impl CountWidth {
    fn size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    fn put(self, buf: &mut Vec<u8>, count: usize) {
        match self {
            Self::U16 => buf.extend_from_slice(&(count as u16).to_be_bytes()),
            Self::U32 => buf.extend_from_slice(&(count as u32).to_be_bytes()),
        }
    }
}

/// Pack pre-encoded items greedily into as few buffers as fit `capacity`.
///
/// Each buffer is `prefix` followed, per section, by an item count and the
/// items placed in that buffer. At least one buffer is always produced.
pub(crate) fn pack_sections(
    prefix: &[u8],
    sections: &[Vec<Vec<u8>>],
    width: CountWidth,
    capacity: usize,
) -> Result<Vec<Vec<u8>>, DiscoveryError> {
    let overhead = prefix.len() + sections.len() * width.size();
    if overhead > capacity {
        return Err(DiscoveryError::InvalidArgument(format!(
            "fixed fields of {} bytes exceed datagram capacity of {}",
            overhead, capacity
        )));
    }

    let assemble = |current: &[Vec<&[u8]>]| {
        let mut buf = prefix.to_vec();
        for items in current {
            width.put(&mut buf, items.len());
            for item in items {
                buf.extend_from_slice(item);
            }
        }
        buf
    };

    let mut packets = Vec::new();
    let mut current: Vec<Vec<&[u8]>> = vec![Vec::new(); sections.len()];
    let mut used = overhead;

    for (index, items) in sections.iter().enumerate() {
        for item in items {
            if overhead + item.len() > capacity {
                return Err(DiscoveryError::InvalidArgument(format!(
                    "item of {} bytes cannot fit in a datagram",
                    item.len()
                )));
            }
            if used + item.len() > capacity {
                packets.push(assemble(&current));
                current.iter_mut().for_each(Vec::clear);
                used = overhead;
            }
            current[index].push(item);
            used += item.len();
        }
    }
    packets.push(assemble(&current));

    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_prepend_header() {
        let mut bufs = DatagramBuffers::new(vec![0xaa, 0xbb], 10);
        assert_eq!(bufs.capacity(), 8);
        bufs.push(&[1, 2, 3]).unwrap();
        assert_eq!(bufs.len(), 1);
        assert_eq!(bufs.into_packets(), vec![vec![0xaa, 0xbb, 1, 2, 3]]);
    }

    #[test]
    fn test_buffers_reject_oversized() {
        let mut bufs = DatagramBuffers::new(vec![0; 4], 8);
        assert!(bufs.push(&[0; 5]).is_err());
        assert!(bufs.is_empty());
    }

    #[test]
    fn test_pack_single_packet() {
        let sections = vec![vec![vec![1, 1], vec![2, 2]], vec![vec![3]]];
        let packets = pack_sections(&[9], &sections, CountWidth::U16, 100).unwrap();
        assert_eq!(packets, vec![vec![9, 0, 2, 1, 1, 2, 2, 0, 1, 3]]);
    }

    #[test]
    fn test_pack_empty_sections() {
        let packets = pack_sections(&[7], &[vec![], vec![]], CountWidth::U32, 64).unwrap();
        assert_eq!(packets, vec![vec![7, 0, 0, 0, 0, 0, 0, 0, 0]]);
    }

    #[test]
    fn test_pack_splits() {
        // overhead 1 + 2 = 3, capacity 8 leaves room for one 4-byte item
        let items: Vec<Vec<u8>> = (0..3).map(|i| vec![i; 4]).collect();
        let packets = pack_sections(&[0xee], &[items], CountWidth::U16, 8).unwrap();
        assert_eq!(packets.len(), 3);
        for (i, p) in packets.iter().enumerate() {
            assert_eq!(p[0], 0xee);
            assert_eq!(&p[1..3], &[0, 1]);
            assert_eq!(&p[3..], &[i as u8; 4]);
        }
    }

    #[test]
    fn test_pack_item_too_large() {
        let result = pack_sections(&[], &[vec![vec![0; 20]]], CountWidth::U16, 10);
        assert!(matches!(result, Err(DiscoveryError::InvalidArgument(_))));
    }

    #[test]
    fn test_pack_prefix_too_large() {
        let result = pack_sections(&[0; 12], &[vec![]], CountWidth::U16, 10);
        assert!(result.is_err());
    }
}
