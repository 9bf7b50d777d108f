//! Message router: transport events -> correlator or observers

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, trace};

use bach_protocol::{ClientId, ConnectionRole, ConnectionState, InboundEvent};

use super::Correlator;
use crate::error::BridgeError;
use crate::transport::TransportEvent;

/// Capacity of the session observer channel
pub const OBSERVER_CHANNEL_CAPACITY: usize = 256;

/// What a session observer sees
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ClientConnected { id: ClientId, peer: SocketAddr },
    ClientDisconnected { id: ClientId },
    ConnectionChanged {
        role: ConnectionRole,
        state: ConnectionState,
    },
    /// A host line that was not consumed as a reply
    Unsolicited(InboundEvent),
}

/// Route transport events until every transport task has exited
///
/// `outbound` is the live outbound state. A queued drop is only acted on
/// while the link is still down, so a drop that was already followed by a
/// reconnect cannot fail a request made on the new connection.
pub async fn run_router(
    mut events: mpsc::Receiver<TransportEvent>,
    correlator: Arc<Correlator>,
    observers: broadcast::Sender<SessionEvent>,
    outbound: watch::Receiver<ConnectionState>,
) {
    debug!("Message router started");

    while let Some(event) = events.recv().await {
        let forwarded = match event {
            TransportEvent::Line(line) => match correlator.offer(line) {
                Some(unsolicited) => {
                    trace!(kind = %unsolicited.kind, data = %unsolicited.data, "Unsolicited host line");
                    SessionEvent::Unsolicited(unsolicited)
                }
                None => continue,
            },
            TransportEvent::StateChanged { role, state } => {
                if role == ConnectionRole::Outbound && !state.is_connected() {
                    if outbound.borrow().is_connected() {
                        debug!(%state, "Stale outbound drop, link already restored");
                    } else if correlator.fail_pending(BridgeError::TransportLost) {
                        info!("Outbound link dropped with a request in flight");
                    }
                }
                SessionEvent::ConnectionChanged { role, state }
            }
            TransportEvent::ClientConnected { id, peer } => SessionEvent::ClientConnected { id, peer },
            TransportEvent::ClientDisconnected { id } => SessionEvent::ClientDisconnected { id },
        };

        // No subscribers is fine
        let _ = observers.send(forwarded);
    }

    debug!("Message router stopped");
}
