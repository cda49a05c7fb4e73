//! Async UDP socket for multicast discovery.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::trace;

use crate::config::DiscoveryConfig;
use crate::core::MAX_DATAGRAM_SIZE;
use crate::protocol::DatagramSet;

/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = MAX_DATAGRAM_SIZE;

/// Async UDP socket sending and receiving discovery datagrams.
#[derive(Debug)]
pub struct MulticastSocket {
    socket: Arc<UdpSocket>,
    recv_buffer: Vec<u8>,
}

impl MulticastSocket {
    /// Bind with default options.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        MulticastSocketBuilder::new().bind(addr).await
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Join a multicast group on `interface` (`UNSPECIFIED` for any).
    pub fn join_group(&self, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
        self.socket.join_multicast_v4(group, interface)
    }

    /// Leave a multicast group.
    pub fn leave_group(&self, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
        self.socket.leave_multicast_v4(group, interface)
    }

    /// Multicast time to live.
    pub fn time_to_live(&self) -> io::Result<u8> {
        Ok(self.socket.multicast_ttl_v4()? as u8)
    }

    /// Set the multicast time to live.
    pub fn set_time_to_live(&self, ttl: u8) -> io::Result<()> {
        self.socket.set_multicast_ttl_v4(u32::from(ttl))
    }

    /// Send one datagram.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, addr).await
    }

    /// Send every datagram of `set` to `addr`. Returns the number sent.
    pub async fn send_set(&self, set: &DatagramSet, addr: SocketAddr) -> io::Result<usize> {
        for packet in &set.packets {
            self.socket.send_to(packet, addr).await?;
        }
        trace!(%addr, format = ?set.format_id, datagrams = set.len(), "sent datagram set");
        Ok(set.len())
    }

    /// Receive a datagram and return the sender's address.
    pub async fn recv_from(&mut self) -> io::Result<(&[u8], SocketAddr)> {
        let (len, addr) = self.socket.recv_from(&mut self.recv_buffer).await?;
        Ok((&self.recv_buffer[..len], addr))
    }

    /// Get a reference to the underlying socket.
    pub fn inner(&self) -> &UdpSocket {
        &self.socket
    }

    /// Get a clone of the Arc-wrapped socket.
    pub fn socket_arc(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

/// Builder for multicast sockets with custom options.
#[derive(Debug, Clone)]
pub struct MulticastSocketBuilder {
    recv_buffer_size: usize,
    time_to_live: Option<u8>,
    loopback: bool,
}

impl Default for MulticastSocketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MulticastSocketBuilder {
    /// Create a new socket builder with default options.
    pub fn new() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            time_to_live: None,
            loopback: false,
        }
    }

    /// Options taken from `config`.
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            recv_buffer_size: config.recv_buffer_size,
            time_to_live: Some(config.time_to_live),
            loopback: config.multicast_loopback,
        }
    }

    /// Set the receive buffer size.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Set the multicast time to live.
    pub fn time_to_live(mut self, ttl: u8) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Deliver our own multicast datagrams back to us.
    pub fn loopback(mut self, enabled: bool) -> Self {
        self.loopback = enabled;
        self
    }

    /// Bind to the given address and create a socket.
    pub async fn bind(self, addr: SocketAddr) -> io::Result<MulticastSocket> {
        let socket = UdpSocket::bind(addr).await?;
        self.from_socket(socket)
    }

    /// Create a socket from an existing UDP socket.
    pub fn from_socket(self, socket: UdpSocket) -> io::Result<MulticastSocket> {
        if let Some(ttl) = self.time_to_live {
            socket.set_multicast_ttl_v4(u32::from(ttl))?;
        }
        socket.set_multicast_loop_v4(self.loopback)?;
        Ok(MulticastSocket {
            socket: Arc::new(socket),
            recv_buffer: vec![0u8; self.recv_buffer_size],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatId;

    #[tokio::test]
    async fn test_socket_bind() {
        let socket = MulticastSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = socket.local_addr().unwrap();
        assert!(addr.port() != 0);
    }

    #[tokio::test]
    async fn test_send_set() {
        let mut server = MulticastSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = MulticastSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let set = DatagramSet {
            format_id: Some(FormatId::from_raw(1)),
            packets: vec![b"first".to_vec(), b"second".to_vec()],
        };
        assert_eq!(client.send_set(&set, server_addr).await.unwrap(), 2);

        let (received, from) = server.recv_from().await.unwrap();
        assert_eq!(received, b"first");
        assert_eq!(from, client.local_addr().unwrap());
        let (received, _) = server.recv_from().await.unwrap();
        assert_eq!(received, b"second");
    }

    #[tokio::test]
    async fn test_time_to_live() {
        let socket = MulticastSocketBuilder::new()
            .time_to_live(3)
            .bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(socket.time_to_live().unwrap(), 3);
        socket.set_time_to_live(7).unwrap();
        assert_eq!(socket.time_to_live().unwrap(), 7);
    }

    #[test]
    fn test_socket_builder() {
        let builder = MulticastSocketBuilder::new()
            .recv_buffer_size(4096)
            .loopback(true);
        assert_eq!(builder.recv_buffer_size, 4096);
        assert!(builder.loopback);

        let config = DiscoveryConfig::default();
        let builder = MulticastSocketBuilder::from_config(&config);
        assert_eq!(builder.time_to_live, Some(config.time_to_live));
    }
}
