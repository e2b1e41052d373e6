//! Transport capability consumed by the write pipeline, plus a UDP implementation.

use crate::error::{ClientError, TransportError};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

/// Moves line-protocol payloads to the server.
///
/// `send` must map every failure onto the closed [`TransportError`] set. Transports that
/// cannot run queries keep the default `query`, which reports
/// [`ClientError::QueryNotSupported`].
pub trait Transport: Send + 'static {
    fn send(&mut self, payload: &str) -> Result<(), TransportError>;

    fn query(&mut self, _query: &str) -> Result<String, ClientError> {
        Err(ClientError::QueryNotSupported)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        (**self).send(payload)
    }

    fn query(&mut self, query: &str) -> Result<String, ClientError> {
        (**self).query(query)
    }
}

/// Largest UDP payload that fits an Ethernet frame without fragmentation.
pub const DEFAULT_MAX_DATAGRAM: usize = 1472;

/// Fire-and-forget UDP transport.
///
/// Payloads larger than the datagram limit are split on line boundaries. UDP gives no
/// server answer, so the only failures are local: socket errors map to
/// `ConnectionFailed`, and a line that cannot fit one datagram is skipped while the rest
/// of the payload is still sent, after which the send reports `BadRequest`.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    max_datagram: usize,
}

impl UdpTransport {
    /// Binds an ephemeral local socket and connects it to `addr`.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let peer = addr.to_socket_addrs()?.next().ok_or_else(|| {
            ClientError::ConfigError("UDP address resolved to nothing".to_string())
        })?;
        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;
        Ok(Self {
            socket,
            peer,
            max_datagram: DEFAULT_MAX_DATAGRAM,
        })
    }

    pub fn with_max_datagram(mut self, max_datagram: usize) -> Self {
        self.max_datagram = max_datagram.max(1);
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn send_datagram(&self, datagram: &str) -> Result<(), TransportError> {
        self.socket
            .send(datagram.as_bytes())
            .map(|_| ())
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", self.peer, e)))
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        if payload.len() <= self.max_datagram {
            return self.send_datagram(payload);
        }

        let mut datagram = String::with_capacity(self.max_datagram);
        let mut oversized = Vec::new();
        for line in payload.split_inclusive('\n') {
            if line.len() > self.max_datagram {
                oversized.push(line.len());
                continue;
            }
            if datagram.len() + line.len() > self.max_datagram {
                self.send_datagram(&datagram)?;
                datagram.clear();
            }
            datagram.push_str(line);
        }
        if !datagram.is_empty() {
            self.send_datagram(&datagram)?;
        }

        if oversized.is_empty() {
            Ok(())
        } else {
            Err(TransportError::BadRequest(format!(
                "skipped {} line(s) over the {} byte datagram limit (sizes {:?})",
                oversized.len(),
                self.max_datagram,
                oversized
            )))
        }
    }
}
