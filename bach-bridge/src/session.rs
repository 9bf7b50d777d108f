//! Bridge session: one transport pair, one router, one request slot
//!
//! A session is built from an immutable [`BridgeConfig`] and owns every task
//! it spawns. There is no process-wide state; two sessions never share a
//! socket or a correlator.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use bach_protocol::{ClientId, ConnectionState, InboundEvent};

use crate::config::{BridgeConfig, ConfigHandle};
use crate::correlator::{run_router, Correlator, ReplyMatch, SessionEvent, OBSERVER_CHANNEL_CAPACITY};
use crate::error::{BridgeError, Result};
use crate::tools::HostChannel;
use crate::transport::{
    spawn_inbound, spawn_outbound, ClientInfo, InboundHandle, OutboundHandle,
    EVENT_CHANNEL_CAPACITY,
};

/// Snapshot of both links, for `/status` and logging
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub outbound: ConnectionState,
    pub outbound_addr: String,
    pub inbound: ConnectionState,
    pub inbound_addr: Option<SocketAddr>,
    pub clients: usize,
    pub canonical_client: Option<ClientId>,
    pub pending_command: Option<String>,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "outbound  {} ({})", self.outbound, self.outbound_addr)?;
        match self.inbound_addr {
            Some(addr) => write!(f, "inbound   {} ({addr})", self.inbound)?,
            None => write!(f, "inbound   {}", self.inbound)?,
        }
        write!(f, ", {} host client(s)", self.clients)?;
        if let Some(id) = self.canonical_client {
            write!(f, ", canonical {id}")?;
        }
        if let Some(command) = &self.pending_command {
            write!(f, "\nawaiting  {command}")?;
        }
        Ok(())
    }
}

pub struct BridgeSession {
    config: ConfigHandle,
    outbound: OutboundHandle,
    inbound: InboundHandle,
    correlator: Arc<Correlator>,
    observers: broadcast::Sender<SessionEvent>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BridgeSession {
    /// Spawn the transport and router tasks. Must run inside a tokio runtime.
    pub fn start(config: ConfigHandle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (observers, _) = broadcast::channel(OBSERVER_CHANNEL_CAPACITY);
        let correlator = Arc::new(Correlator::new());

        let (outbound, outbound_task) =
            spawn_outbound(Arc::clone(&config), events_tx.clone(), &shutdown_tx);
        let (inbound, inbound_task) = spawn_inbound(Arc::clone(&config), events_tx, &shutdown_tx);
        let router_task = tokio::spawn(run_router(
            events_rx,
            Arc::clone(&correlator),
            observers.clone(),
            outbound.subscribe_state(),
        ));

        info!(
            outbound = %config.outbound.addr(),
            inbound = %config.inbound.addr(),
            "Bridge session started"
        );

        Self {
            config,
            outbound,
            inbound,
            correlator,
            observers,
            shutdown_tx,
            tasks: Mutex::new(vec![outbound_task, inbound_task, router_task]),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn outbound_state(&self) -> ConnectionState {
        self.outbound.state()
    }

    pub fn inbound_state(&self) -> ConnectionState {
        self.inbound.state()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.inbound.registry().clients()
    }

    pub fn status(&self) -> SessionStatus {
        let registry = self.inbound.registry();
        SessionStatus {
            outbound: self.outbound.state(),
            outbound_addr: self.config.outbound.addr(),
            inbound: self.inbound.state(),
            inbound_addr: self.inbound.local_addr(),
            clients: registry.client_count(),
            canonical_client: registry.canonical(),
            pending_command: self.correlator.pending().map(|p| p.command),
        }
    }

    pub async fn wait_outbound_connected(&self, timeout: Duration) -> bool {
        self.outbound.wait_connected(timeout).await
    }

    pub async fn wait_inbound_bound(&self, timeout: Duration) -> Option<SocketAddr> {
        self.inbound.wait_bound(timeout).await
    }

    /// Observer stream: unsolicited lines and connectivity changes
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.observers.subscribe()
    }

    /// Fire-and-forget command
    ///
    /// Refused with `Busy` while a reply is awaited, since the host would
    /// answer the two commands on the same untagged stream.
    pub async fn send_command(&self, command: &str) -> Result<()> {
        let command = non_empty(command)?;
        self.correlator.ensure_idle()?;
        debug!(%command, "Sending command");
        self.outbound.send(command).await
    }

    /// Send a command and suspend until its reply, the deadline, or loss of
    /// the outbound link
    pub async fn send_and_wait(
        &self,
        command: &str,
        timeout: Duration,
        matcher: ReplyMatch,
    ) -> Result<InboundEvent> {
        let command = non_empty(command)?;
        if !self.outbound.state().is_connected() {
            return Err(BridgeError::TransportFailed);
        }

        let slot = self.correlator.acquire(command, timeout, matcher)?;
        debug!(token = %slot.token(), %command, "Sending command, awaiting reply");
        // Dropping the slot on a failed send releases it
        self.outbound.send(command).await?;
        slot.wait().await
    }

    /// Write a line to every connected host client on the inbound side
    pub fn broadcast(&self, line: &str) -> usize {
        self.inbound.registry().broadcast(line)
    }

    /// Stop every task and wait for them to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.correlator.fail_pending(BridgeError::Cancelled);

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        info!("Bridge session stopped");
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[async_trait]
impl HostChannel for BridgeSession {
    async fn send_command(&self, command: &str) -> Result<()> {
        BridgeSession::send_command(self, command).await
    }

    async fn send_and_wait(
        &self,
        command: &str,
        timeout: Duration,
        matcher: ReplyMatch,
    ) -> Result<InboundEvent> {
        BridgeSession::send_and_wait(self, command, timeout, matcher).await
    }

    fn default_timeout(&self) -> Duration {
        self.config.requests.timeout()
    }
}

fn non_empty(command: &str) -> Result<&str> {
    let trimmed = command.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return Err(BridgeError::invalid_arguments("send", "command is empty"));
    }
    Ok(trimmed)
}
