//! UDP transport for RTP streams
//!
//! One socket per stream, owned exclusively by its transport. The send
//! side is an unbound-source socket with multicast TTL; the receive side
//! binds the RTP port on all interfaces, joins the multicast group when the
//! source address calls for it, and reads with a 100 ms timeout so that
//! shutdown is prompt.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::error::{Aes67Error, Result};

#[cfg(test)]
mod tests;

/// Receive socket buffer, sized to absorb bursts
const RECV_BUFFER_BYTES: usize = 2 * 1024 * 1024;

/// Receive poll timeout
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Default multicast TTL
pub const DEFAULT_TTL: u32 = 32;

/// Whether an I/O error is transient on the packet path
///
/// Transient errors are counted and the packet dropped; they never tear
/// down a session. Oversized datagrams (EMSGSIZE) surface through the
/// `InvalidInput` kind.
#[must_use]
pub fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::InvalidInput
    )
}

/// Sending half of an RTP stream
pub struct SenderTransport {
    socket: UdpSocket,
    dest: SocketAddrV4,
}

impl SenderTransport {
    /// Open a send socket for the given destination
    ///
    /// # Errors
    ///
    /// Returns `BindFailed` if the ephemeral source socket cannot be opened
    /// or the TTL cannot be applied.
    pub fn open(dest_ip: Ipv4Addr, port: u16, ttl: u32) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|e| {
            Aes67Error::BindFailed {
                addr: "0.0.0.0:0".to_string(),
                source: e,
            }
        })?;

        if dest_ip.is_multicast() {
            socket
                .set_multicast_ttl_v4(ttl)
                .map_err(|e| Aes67Error::BindFailed {
                    addr: dest_ip.to_string(),
                    source: e,
                })?;
        }

        let dest = SocketAddrV4::new(dest_ip, port);
        debug!("sender transport open, dest {dest}, ttl {ttl}");
        Ok(Self { socket, dest })
    }

    /// Send one RTP packet to the configured destination
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error; callers classify it with
    /// [`is_transient`].
    pub fn send(&self, packet: &[u8]) -> io::Result<usize> {
        self.socket.send_to(packet, self.dest)
    }

    /// The configured destination
    #[must_use]
    pub fn destination(&self) -> SocketAddrV4 {
        self.dest
    }
}

/// Receiving half of an RTP stream
pub struct ReceiverTransport {
    socket: UdpSocket,
    group: Option<(Ipv4Addr, Ipv4Addr)>,
}

impl ReceiverTransport {
    /// Bind the RTP port and join `source_ip` when it is multicast
    ///
    /// `interface` selects the interface for the multicast join;
    /// `Ipv4Addr::UNSPECIFIED` lets the kernel choose.
    ///
    /// # Errors
    ///
    /// Returns `BindFailed` when the port cannot be bound or the multicast
    /// join is refused; both are permanent faults for this stream.
    pub fn bind(source_ip: Ipv4Addr, port: u16, interface: Ipv4Addr) -> Result<Self> {
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(|e| {
            Aes67Error::BindFailed {
                addr: bind_addr.to_string(),
                source: e,
            }
        })?;

        // Multiple receivers of the same group on one host are routine.
        let _ = socket.set_reuse_address(true);
        if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_BYTES) {
            warn!("could not grow receive buffer to {RECV_BUFFER_BYTES}: {e}");
        }

        socket
            .bind(&SocketAddr::V4(bind_addr).into())
            .map_err(|e| Aes67Error::BindFailed {
                addr: bind_addr.to_string(),
                source: e,
            })?;

        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(RECV_TIMEOUT)).map_err(Aes67Error::Network)?;

        let mut group = None;
        if source_ip.is_multicast() {
            socket
                .join_multicast_v4(&source_ip, &interface)
                .map_err(|e| Aes67Error::BindFailed {
                    addr: source_ip.to_string(),
                    source: e,
                })?;
            group = Some((source_ip, interface));
            info!("joined multicast group {source_ip} on port {port}");
        } else {
            debug!("listening for unicast {source_ip} on port {port}");
        }

        Ok(Self { socket, group })
    }

    /// Receive one datagram
    ///
    /// Returns `Ok(None)` on poll timeout so the caller's loop can observe
    /// its stop flag.
    ///
    /// # Errors
    ///
    /// Returns only non-transient socket errors.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Clone the underlying socket handle for a receive thread
    ///
    /// # Errors
    ///
    /// Returns `Network` if the descriptor cannot be duplicated.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone().map_err(Aes67Error::Network)?,
            group: None, // membership belongs to the original handle
        })
    }

    /// The bound local port
    ///
    /// # Errors
    ///
    /// Returns `Network` if the socket address cannot be read.
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr().map_err(Aes67Error::Network)?.port())
    }
}

impl Drop for ReceiverTransport {
    fn drop(&mut self) {
        if let Some((group, interface)) = self.group.take() {
            let _ = self.socket.leave_multicast_v4(&group, &interface);
        }
    }
}
