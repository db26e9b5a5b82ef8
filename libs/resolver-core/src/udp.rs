//! The datagram endpoints used to talk to upstream servers.

use std::io::{self, IoSlice};
use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::AsRawFd as _;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::socket::{ControlMessage, MsgFlags, SockaddrStorage, sendmsg};
use socket2::{Domain, Type};
use tokio::net::UdpSocket;

use crate::packet::DnsPacket;

const DNS_PORT: u16 = 53;

/// Hard ceiling on how long an EAGAIN'd send may wait for the socket to
/// become writable again.
const SEND_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The socket did not become writable within the send timeout.
    #[error("timed out waiting for the socket to become writable")]
    TimedOut,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One of the Manager's two upstream sockets.
///
/// The socket is unbound; the kernel assigns a source address on the first
/// send. It stays registered with the reactor until the Manager goes away.
#[derive(Debug)]
pub(crate) struct DnsEndpoint {
    socket: UdpSocket,
    port: u16,
}

impl DnsEndpoint {
    pub(crate) fn new(domain: Domain) -> io::Result<Self> {
        // socket2 opens the socket with SOCK_CLOEXEC on Linux.
        let socket = socket2::Socket::new(domain, Type::DGRAM, None)?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::try_from(std::net::UdpSocket::from(socket))?;

        Ok(Self {
            socket,
            port: DNS_PORT,
        })
    }

    pub(crate) async fn readable(&self) -> io::Result<()> {
        self.socket.readable().await
    }

    /// Send one query datagram to `address`, optionally pinned to the
    /// interface `ifindex` via pktinfo ancillary data.
    #[expect(
        clippy::wildcard_enum_match_arm,
        reason = "Only EINTR and EAGAIN get special handling."
    )]
    pub(crate) async fn send(
        &self,
        address: IpAddr,
        ifindex: Option<u32>,
        packet: &DnsPacket,
    ) -> Result<(), SendError> {
        let ifindex = ifindex.unwrap_or(0);

        let destination = match address {
            IpAddr::V4(addr) => SocketAddr::V4(SocketAddrV4::new(addr, self.port)),
            // Link-local targets need the interface carried in the scope ID.
            IpAddr::V6(addr) => SocketAddr::V6(SocketAddrV6::new(addr, self.port, 0, ifindex)),
        };
        let destination = SockaddrStorage::from(destination);

        let pktinfo4 = match address {
            IpAddr::V4(_) if ifindex > 0 => Some(libc::in_pktinfo {
                ipi_ifindex: ifindex as libc::c_int,
                ipi_spec_dst: libc::in_addr { s_addr: 0 },
                ipi_addr: libc::in_addr { s_addr: 0 },
            }),
            _ => None,
        };
        let pktinfo6 = match address {
            IpAddr::V6(_) if ifindex > 0 => Some(libc::in6_pktinfo {
                ipi6_addr: libc::in6_addr { s6_addr: [0; 16] },
                ipi6_ifindex: ifindex,
            }),
            _ => None,
        };

        let mut control_messages = Vec::new();
        if let Some(pktinfo) = &pktinfo4 {
            control_messages.push(ControlMessage::Ipv4PacketInfo(pktinfo));
        }
        if let Some(pktinfo) = &pktinfo6 {
            control_messages.push(ControlMessage::Ipv6PacketInfo(pktinfo));
        }

        let iov = [IoSlice::new(packet.as_bytes())];

        loop {
            match sendmsg(
                self.socket.as_raw_fd(),
                &iov,
                &control_messages,
                MsgFlags::empty(),
                Some(&destination),
            ) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => {
                    tokio::time::timeout(SEND_TIMEOUT, self.socket.writable())
                        .await
                        .map_err(|_elapsed| SendError::TimedOut)??;
                }
                Err(errno) => return Err(SendError::Io(io::Error::from(errno))),
            }
        }
    }

    /// Read one pending datagram, sized by the kernel's pending-byte
    /// count. Spurious wakeups yield `Ok(None)`.
    pub(crate) fn recv(&self) -> io::Result<Option<DnsPacket>> {
        let mut pending: libc::c_int = 0;

        // Safety: the fd is valid for the lifetime of `self` and FIONREAD
        // writes a single c_int.
        if unsafe { libc::ioctl(self.socket.as_raw_fd(), libc::FIONREAD, &mut pending) } < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut buffer = vec![0u8; pending.max(0) as usize];

        match self.socket.try_recv(&mut buffer) {
            Ok(0) => Err(io::Error::other("zero-length datagram")),
            Ok(len) => {
                buffer.truncate(len);

                Ok(Some(DnsPacket::new(buffer)))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn sends_and_receives_datagrams() {
        let listener = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut endpoint = DnsEndpoint::new(Domain::IPV4).unwrap();
        endpoint.port = listener.local_addr().unwrap().port();

        let query = DnsPacket::new(vec![0x12, 0x34, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
        endpoint
            .send(IpAddr::V4(Ipv4Addr::LOCALHOST), None, &query)
            .await
            .unwrap();

        let mut buffer = [0u8; 64];
        let (len, from) = listener.recv_from(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..len], query.as_bytes());

        listener.send_to(&[0xAB; 12], from).await.unwrap();

        endpoint.readable().await.unwrap();
        let reply = endpoint.recv().unwrap().unwrap();
        assert_eq!(reply.as_bytes(), &[0xAB; 12]);
    }

    #[tokio::test]
    async fn recv_without_pending_datagram_is_a_spurious_wakeup() {
        let listener = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut endpoint = DnsEndpoint::new(Domain::IPV4).unwrap();
        endpoint.port = listener.local_addr().unwrap().port();

        // Sending binds the socket so there is something to poll.
        let query = DnsPacket::new(vec![0; 12]);
        endpoint
            .send(IpAddr::V4(Ipv4Addr::LOCALHOST), None, &query)
            .await
            .unwrap();

        assert!(endpoint.recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn send_can_be_pinned_to_the_loopback_interface() {
        let listener = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut endpoint = DnsEndpoint::new(Domain::IPV4).unwrap();
        endpoint.port = listener.local_addr().unwrap().port();

        let loopback_index = unsafe { libc::if_nametoindex(c"lo".as_ptr()) };
        assert_ne!(loopback_index, 0);

        let query = DnsPacket::new(vec![0x42; 12]);
        endpoint
            .send(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                Some(loopback_index),
                &query,
            )
            .await
            .unwrap();

        let mut buffer = [0u8; 64];
        let (len, _) = listener.recv_from(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..len], query.as_bytes());
    }
}
