use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::message::Message;

use super::{ChannelError, MULTICAST_GROUP, REBIND_DELAY};

const MAX_DATAGRAM: usize = 65_535;

/// Multicast subscriber with a debounced port rebind.
///
/// Any number of receivers may share one port; each of them sees every
/// message sent to it. A receiver that fails to bind stays usable,
/// returns nothing from [`poll`](ChannelReceiver::poll) and exposes the
/// failure through [`last_error`](ChannelReceiver::last_error).
pub struct ChannelReceiver {
    port: u16,
    sock: Option<UdpSocket>,
    pending_port: Option<u16>,
    port_changed_at: Instant,
    last_error: Option<ChannelError>,
    clock: Arc<dyn Clock>,
    buf: Box<[u8; MAX_DATAGRAM]>,
}

impl ChannelReceiver {
    pub fn new(port: u16) -> Self {
        Self::with_clock(port, Arc::new(MonotonicClock))
    }

    pub fn with_clock(port: u16, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let mut last_error = None;
        let sock = match join(port) {
            Ok(sock) => Some(sock),
            Err(e) => {
                warn!("channel rx bind failed: {e}");
                last_error = Some(e);
                None
            }
        };
        Self {
            port,
            sock,
            pending_port: None,
            port_changed_at: now,
            last_error,
            clock,
            buf: Box::new([0u8; MAX_DATAGRAM]),
        }
    }

    /// Active channel port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Port change waiting out the quiet window, if any.
    pub fn pending_port(&self) -> Option<u16> {
        self.pending_port
    }

    /// Whether the socket is currently bound and joined to the group.
    pub fn is_bound(&self) -> bool {
        self.sock.is_some()
    }

    /// Most recent transport failure. Bind failures are recoverable: a
    /// later [`update_port`](ChannelReceiver::update_port) retries.
    pub fn last_error(&self) -> Option<&ChannelError> {
        self.last_error.as_ref()
    }

    /// Return the oldest pending message, or `None`. Never blocks.
    ///
    /// One datagram per call, in arrival order, so steady per-frame
    /// polling drains the queue without skipping messages.
    pub fn poll(&mut self) -> Option<Message> {
        let sock = self.sock.as_ref()?;
        match sock.recv_from(&mut self.buf[..]) {
            Ok((len, _)) => Some(Message::from_wire(&self.buf[..len])),
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("channel recv failed: {e}");
                self.last_error = Some(ChannelError::Socket(e));
                None
            }
        }
    }

    /// Request a port change, applied once the value has been stable for
    /// the quiet window: the old binding is torn down and exactly one
    /// new binding is established. Calling every frame with the current
    /// port is a silent no-op.
    pub fn update_port(&mut self, new_port: u16) {
        if new_port == self.port {
            self.pending_port = None;
            return;
        }
        let now = self.clock.now();
        if self.pending_port != Some(new_port) {
            self.pending_port = Some(new_port);
            self.port_changed_at = now;
            return;
        }
        if now.duration_since(self.port_changed_at) >= REBIND_DELAY {
            info!("channel rx port {} -> {}, rejoining", self.port, new_port);
            self.sock = None;
            self.port = new_port;
            self.pending_port = None;
            match join(new_port) {
                Ok(sock) => {
                    self.sock = Some(sock);
                    self.last_error = None;
                }
                Err(e) => {
                    warn!("channel rx rebind failed: {e}");
                    self.last_error = Some(e);
                }
            }
        }
    }
}

/// Bind with address reuse and join the group. Reuse flags must be set
/// before bind, which is why this goes through socket2 rather than
/// `UdpSocket::bind`.
fn join(port: u16) -> Result<UdpSocket, ChannelError> {
    let sock =
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(ChannelError::Socket)?;
    sock.set_reuse_address(true).map_err(ChannelError::Socket)?;
    #[cfg(unix)]
    sock.set_reuse_port(true).map_err(ChannelError::Socket)?;
    sock.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())
        .map_err(|source| ChannelError::Bind { port, source })?;
    sock.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)
        .map_err(ChannelError::Socket)?;
    sock.set_nonblocking(true).map_err(ChannelError::Socket)?;
    info!("channel rx joined {MULTICAST_GROUP}:{port}");
    Ok(sock.into())
}
