//! Inbound channel: the bridge as TCP server for the host
//!
//! The host connects back to deliver replies and events. Every accepted
//! connection is registered; the newest is canonical. The channel counts
//! as `Connected` while at least one host client is registered.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use bach_protocol::{ConnectionRole, ConnectionState, InboundEvent, LineCodec};

use super::{Backoff, ClientRegistry, TransportEvent};
use crate::config::{BridgeConfig, ReconnectConfig};

/// Lines queued per host client for writing
const CLIENT_CHANNEL_CAPACITY: usize = 64;

/// Cloneable view of the inbound listener
#[derive(Clone)]
pub struct InboundHandle {
    registry: Arc<ClientRegistry>,
    state: watch::Receiver<ConnectionState>,
    bound: watch::Receiver<Option<SocketAddr>>,
}

impl InboundHandle {
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Address the listener is bound to, once bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.borrow()
    }

    /// Wait for the listener to bind. `None` on timeout.
    pub async fn wait_bound(&self, timeout: Duration) -> Option<SocketAddr> {
        let mut bound = self.bound.clone();
        let addr = match tokio::time::timeout(timeout, bound.wait_for(Option::is_some)).await {
            Ok(Ok(addr)) => *addr,
            _ => None,
        };
        addr
    }
}

/// Start the inbound listener
pub fn spawn_inbound(
    config: Arc<BridgeConfig>,
    events: mpsc::Sender<TransportEvent>,
    shutdown_tx: &broadcast::Sender<()>,
) -> (InboundHandle, JoinHandle<()>) {
    let registry = Arc::new(ClientRegistry::new());
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let (bound_tx, bound_rx) = watch::channel(None);

    let ctx = Arc::new(InboundContext {
        registry: Arc::clone(&registry),
        state_tx,
        events,
        close_superseded: config.inbound.close_superseded,
        shutdown_tx: shutdown_tx.clone(),
    });

    let task = tokio::spawn(run_listener(
        config.inbound.addr(),
        config.reconnect.clone(),
        ctx,
        bound_tx,
        shutdown_tx.subscribe(),
    ));

    (
        InboundHandle {
            registry,
            state: state_rx,
            bound: bound_rx,
        },
        task,
    )
}

/// State shared by the accept loop and every client task
struct InboundContext {
    registry: Arc<ClientRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::Sender<TransportEvent>,
    close_superseded: bool,
    shutdown_tx: broadcast::Sender<()>,
}

impl InboundContext {
    async fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            self.emit_state(state).await;
        }
    }

    /// Recompute `Connected`/`Listening` from the registry
    async fn refresh_state(&self) {
        let mut next = ConnectionState::Listening;
        let changed = self.state_tx.send_if_modified(|current| {
            next = if self.registry.client_count() > 0 {
                ConnectionState::Connected
            } else {
                ConnectionState::Listening
            };
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            self.emit_state(next).await;
        }
    }

    async fn emit_state(&self, state: ConnectionState) {
        debug!(role = %ConnectionRole::Inbound, %state, "Connection state changed");
        let _ = self
            .events
            .send(TransportEvent::StateChanged {
                role: ConnectionRole::Inbound,
                state,
            })
            .await;
    }
}

/// Bind (retrying with backoff), then accept until shutdown
async fn run_listener(
    addr: String,
    reconnect: ReconnectConfig,
    ctx: Arc<InboundContext>,
    bound_tx: watch::Sender<Option<SocketAddr>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut backoff = Backoff::new(&reconnect);

    let listener = loop {
        let bind = tokio::select! {
            result = TcpListener::bind(&addr) => result,
            _ = shutdown.recv() => return,
        };

        match bind {
            Ok(listener) => break listener,
            Err(e) => {
                ctx.set_state(ConnectionState::Disconnected).await;
                let delay = backoff.next_delay();
                warn!(
                    %addr,
                    error = %e,
                    retry_ms = delay.as_millis() as u64,
                    "Failed to bind inbound listener"
                );
                if !backoff_or_shutdown(delay, &mut shutdown).await {
                    return;
                }
            }
        }
    };

    backoff.reset();
    let local = listener.local_addr().ok();
    bound_tx.send_replace(local);
    info!(addr = ?local, "Inbound listener bound");
    ctx.refresh_state().await;

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping inbound listener");
                break;
            }
        };

        match accepted {
            Ok((stream, peer)) => {
                backoff.reset();
                debug!(%peer, "New host connection");
                let _ = stream.set_nodelay(true);
                let client_shutdown = ctx.shutdown_tx.subscribe();
                tokio::spawn(handle_client(stream, peer, Arc::clone(&ctx), client_shutdown));
            }
            Err(e) => {
                let delay = backoff.next_delay();
                error!(error = %e, retry_ms = delay.as_millis() as u64, "Inbound accept error");
                if !backoff_or_shutdown(delay, &mut shutdown).await {
                    info!("Shutdown signal received during accept backoff");
                    break;
                }
            }
        }
    }

    bound_tx.send_replace(None);
    ctx.set_state(ConnectionState::Disconnected).await;
}

/// Sleep for `delay` unless shutdown arrives first. `false` means stop.
async fn backoff_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.recv() => false,
    }
}

/// Read lines from one host client and write queued lines to it
async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<InboundContext>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(CLIENT_CHANNEL_CAPACITY);
    let id = ctx.registry.register(peer, outgoing_tx);
    info!(client = %id, %peer, "Host client connected");

    if ctx.close_superseded {
        for stale in ctx.registry.close_all_except(id) {
            info!(client = %stale, "Closing superseded host client");
        }
    }

    let _ = ctx
        .events
        .send(TransportEvent::ClientConnected { id, peer })
        .await;
    ctx.refresh_state().await;

    let (reader, writer) = stream.into_split();
    let mut reader = FramedRead::new(reader, LineCodec::new());
    let mut writer = FramedWrite::new(writer, LineCodec::new());

    loop {
        tokio::select! {
            read = reader.next() => match read {
                Some(Ok(line)) => {
                    if let Some(event) = InboundEvent::parse(&line, Some(id)) {
                        if ctx.events.send(TransportEvent::Line(event)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(client = %id, error = %e, "Host client read failed");
                    break;
                }
                None => {
                    debug!(client = %id, "Host client closed the connection");
                    break;
                }
            },
            outgoing = outgoing_rx.recv() => match outgoing {
                Some(line) => {
                    if let Err(e) = writer.send(line).await {
                        warn!(client = %id, error = %e, "Host client write failed");
                        break;
                    }
                }
                // Registry dropped our sender: superseded or removed
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }

    ctx.registry.unregister(id);
    info!(client = %id, "Host client disconnected");
    let _ = ctx
        .events
        .send(TransportEvent::ClientDisconnected { id })
        .await;
    ctx.refresh_state().await;
}
