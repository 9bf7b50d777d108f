//! Outbound channel: the bridge as TCP client of the host
//!
//! A supervisor task owns the socket. It connects, serves write requests
//! until the link drops, waits out the backoff delay and tries again,
//! forever. Callers talk to it through an [`OutboundHandle`].

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use bach_protocol::{ConnectionRole, ConnectionState, LineCodec};

use super::{Backoff, TransportEvent};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Pending writes queued for the supervisor
const FRAME_CHANNEL_CAPACITY: usize = 32;

/// One line to write, acknowledged once it is flushed (or not)
struct OutboundFrame {
    line: String,
    ack: oneshot::Sender<bool>,
}

/// Cheap, cloneable handle to the outbound supervisor
#[derive(Clone)]
pub struct OutboundHandle {
    frames: mpsc::Sender<OutboundFrame>,
    state: watch::Receiver<ConnectionState>,
}

impl OutboundHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Write one line to the host
    ///
    /// Fails immediately with `TransportFailed` when the link is not
    /// `Connected`; nothing is queued for later delivery. The codec adds the
    /// line terminator if the caller left it off.
    pub async fn send(&self, line: &str) -> Result<()> {
        if !self.state().is_connected() {
            return Err(BridgeError::TransportFailed);
        }

        let (ack, ack_rx) = oneshot::channel();
        self.frames
            .send(OutboundFrame {
                line: line.to_string(),
                ack,
            })
            .await
            .map_err(|_| BridgeError::TransportFailed)?;

        match ack_rx.await {
            Ok(true) => Ok(()),
            _ => Err(BridgeError::TransportFailed),
        }
    }

    /// Wait until the link is `Connected`. Returns `false` on timeout.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut state = self.state.clone();
        tokio::time::timeout(timeout, state.wait_for(|s| s.is_connected()))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}

/// Start the outbound supervisor
pub fn spawn_outbound(
    config: Arc<BridgeConfig>,
    events: mpsc::Sender<TransportEvent>,
    shutdown_tx: &broadcast::Sender<()>,
) -> (OutboundHandle, JoinHandle<()>) {
    let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let supervisor = OutboundSupervisor {
        addr: config.outbound.addr(),
        backoff: Backoff::new(&config.reconnect),
        frames: frames_rx,
        state_tx,
        events,
        shutdown: shutdown_tx.subscribe(),
    };
    let handle = tokio::spawn(supervisor.run());

    (
        OutboundHandle {
            frames: frames_tx,
            state: state_rx,
        },
        handle,
    )
}

/// Why a live connection ended
#[derive(Debug, PartialEq, Eq)]
enum ConnectionExit {
    Closed,
    Shutdown,
}

struct OutboundSupervisor {
    addr: String,
    backoff: Backoff,
    frames: mpsc::Receiver<OutboundFrame>,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::Sender<TransportEvent>,
    shutdown: broadcast::Receiver<()>,
}

impl OutboundSupervisor {
    async fn run(mut self) {
        info!(addr = %self.addr, "Outbound supervisor started");

        loop {
            self.set_state(ConnectionState::Connecting).await;

            let connected = {
                let connect = TcpStream::connect(&self.addr);
                tokio::pin!(connect);
                loop {
                    tokio::select! {
                        result = &mut connect => break Some(result),
                        Some(frame) = self.frames.recv() => {
                            let _ = frame.ack.send(false);
                        }
                        _ = self.shutdown.recv() => break None,
                    }
                }
            };

            match connected {
                None => break,
                Some(Ok(stream)) => {
                    self.backoff.reset();
                    let _ = stream.set_nodelay(true);
                    info!(addr = %self.addr, "Outbound connected");
                    self.set_state(ConnectionState::Connected).await;

                    if self.serve(stream).await == ConnectionExit::Shutdown {
                        break;
                    }
                    info!(addr = %self.addr, "Outbound connection lost");
                }
                Some(Err(e)) => {
                    debug!(addr = %self.addr, error = %e, "Outbound connect failed");
                }
            }

            self.set_state(ConnectionState::Disconnected).await;

            let delay = self.backoff.next_delay();
            debug!(
                attempt = self.backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Scheduling outbound reconnect"
            );
            if !self.wait_retry(delay).await {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected).await;
        info!("Outbound supervisor stopped");
    }

    /// Serve writes on a live connection until it drops or shutdown
    async fn serve(&mut self, stream: TcpStream) -> ConnectionExit {
        let (reader, writer) = stream.into_split();
        let mut reader = FramedRead::new(reader, LineCodec::new());
        let mut writer = FramedWrite::new(writer, LineCodec::new());

        loop {
            tokio::select! {
                frame = self.frames.recv() => {
                    let Some(frame) = frame else {
                        // Every handle is gone
                        return ConnectionExit::Shutdown;
                    };
                    match writer.send(frame.line).await {
                        Ok(()) => {
                            let _ = frame.ack.send(true);
                        }
                        Err(e) => {
                            warn!(error = %e, "Outbound write failed");
                            let _ = frame.ack.send(false);
                            return ConnectionExit::Closed;
                        }
                    }
                }
                read = reader.next() => match read {
                    Some(Ok(line)) => {
                        debug!(%line, "Ignoring data received on outbound channel");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Outbound read failed");
                        return ConnectionExit::Closed;
                    }
                    None => return ConnectionExit::Closed,
                },
                _ = self.shutdown.recv() => return ConnectionExit::Shutdown,
            }
        }
    }

    /// Sleep for `delay`, rejecting writes meanwhile. `false` on shutdown.
    async fn wait_retry(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                Some(frame) = self.frames.recv() => {
                    let _ = frame.ack.send(false);
                }
                _ = self.shutdown.recv() => return false,
            }
        }
    }

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
            debug!(role = %ConnectionRole::Outbound, %state, "Connection state changed");
            let _ = self
                .events
                .send(TransportEvent::StateChanged {
                    role: ConnectionRole::Outbound,
                    state,
                })
                .await;
        }
    }
}
