/*
┌─────────────┐   send(msg)    ┌──────────────────────┐
│ stage A     │ ─────────────▶ │ 239.255.42.99:port   │
│ (sender)    │                │  multicast group     │
└─────────────┘                └──────────┬───────────┘
                                          │ fan-out
                        ┌─────────────────┼─────────────────┐
                        ▼                 ▼                 ▼
                  ┌───────────┐     ┌───────────┐     ┌───────────┐
                  │ stage B   │     │ stage C   │     │ stage D   │
                  │ poll()    │     │ poll()    │     │ poll()    │
                  └───────────┘     └───────────┘     └───────────┘

One fixed group address for the whole process; the port is the channel.
Delivery is best effort, at most once per receiver.
*/
use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;

pub mod receiver;
pub mod sender;

pub use receiver::ChannelReceiver;
pub use sender::ChannelSender;

/// Link-local multicast group shared by every sender and receiver.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);

/// TTL 1 keeps bus traffic on the local machine.
pub(crate) const MULTICAST_TTL: u32 = 1;

/// Quiet window a port change must survive before the binding moves.
pub(crate) const REBIND_DELAY: Duration = Duration::from_secs(3);

/// Transport failures. All of these are expected steady-state conditions
/// and are recorded on the channel rather than raised into the frame
/// loop.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("bind to port {port} failed: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    #[error("socket setup failed: {0}")]
    Socket(std::io::Error),

    #[error("send failed: {0}")]
    Send(std::io::Error),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}
