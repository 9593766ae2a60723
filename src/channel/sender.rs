use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::message::Message;

use super::{ChannelError, MULTICAST_GROUP, MULTICAST_TTL, REBIND_DELAY};

/// Fire-and-forget multicast publisher with a debounced destination
/// port.
///
/// Construction never fails: if the socket cannot be created the sender
/// stays usable, drops everything it is given and exposes the failure
/// through [`last_error`](ChannelSender::last_error).
pub struct ChannelSender {
    port: u16,
    sock: Option<UdpSocket>,
    pending_port: Option<u16>,
    port_changed_at: Instant,
    last_error: Option<ChannelError>,
    clock: Arc<dyn Clock>,
}

impl ChannelSender {
    pub fn new(port: u16) -> Self {
        Self::with_clock(port, Arc::new(MonotonicClock))
    }

    pub fn with_clock(port: u16, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let mut last_error = None;
        let sock = match open_socket() {
            Ok(sock) => {
                info!("channel tx ready, {MULTICAST_GROUP}:{port}");
                Some(sock)
            }
            Err(e) => {
                warn!("channel tx socket unavailable: {e}");
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
        }
    }

    /// Active destination port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Port change waiting out the quiet window, if any.
    pub fn pending_port(&self) -> Option<u16> {
        self.pending_port
    }

    /// Most recent transport failure. Failures are recorded here instead
    /// of being surfaced to the frame loop.
    pub fn last_error(&self) -> Option<&ChannelError> {
        self.last_error.as_ref()
    }

    /// Broadcast a message to every receiver on this port.
    ///
    /// Best effort: the write is non-blocking and bounded by the local
    /// socket buffer, there are no retries, and loss is tolerated by
    /// consumers as "no update".
    pub fn send(&mut self, message: &Message) {
        let Some(sock) = &self.sock else { return };
        let payload = match message.to_wire() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("dropping unencodable message: {e}");
                self.last_error = Some(ChannelError::Encode(e));
                return;
            }
        };
        let dest = SocketAddrV4::new(MULTICAST_GROUP, self.port);
        if let Err(e) = sock.send_to(&payload, dest) {
            debug!("channel send to port {} failed: {e}", self.port);
            self.last_error = Some(ChannelError::Send(e));
        }
    }

    /// Request a destination port change, applied once the value has
    /// been stable for the quiet window. Calling every frame with the
    /// current port is a silent no-op.
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
            info!("channel tx port {} -> {}", self.port, new_port);
            self.port = new_port;
            self.pending_port = None;
        }
    }
}

fn open_socket() -> Result<UdpSocket, ChannelError> {
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(ChannelError::Socket)?;
    sock.set_multicast_ttl_v4(MULTICAST_TTL)
        .map_err(ChannelError::Socket)?;
    sock.set_multicast_loop_v4(true).map_err(ChannelError::Socket)?;
    sock.set_nonblocking(true).map_err(ChannelError::Socket)?;
    Ok(sock)
}
