//! Dual-socket transport to the host application
//!
//! The bridge keeps two independent, self-healing TCP links:
//!
//! - **outbound**: the bridge connects to the host and writes commands
//! - **inbound**: the bridge listens and the host connects back with
//!   replies and spontaneous events
//!
//! Both report through a single [`TransportEvent`] stream consumed by the
//! router.

pub mod backoff;
pub mod inbound;
pub mod outbound;
pub mod registry;

use std::net::SocketAddr;

use bach_protocol::{ClientId, ConnectionRole, ConnectionState, InboundEvent};

pub use backoff::Backoff;
pub use inbound::{spawn_inbound, InboundHandle};
pub use outbound::{spawn_outbound, OutboundHandle};
pub use registry::{ClientInfo, ClientRegistry};

/// Capacity of the transport -> router event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the transport tasks report upward
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One assembled line from a host client
    Line(InboundEvent),
    StateChanged {
        role: ConnectionRole,
        state: ConnectionState,
    },
    ClientConnected {
        id: ClientId,
        peer: SocketAddr,
    },
    ClientDisconnected {
        id: ClientId,
    },
}
