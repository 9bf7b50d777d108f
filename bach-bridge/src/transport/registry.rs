//! Host connection registry for the inbound server role
//!
//! Every accepted host connection is recorded here. The most recently
//! accepted one is canonical; older ones stay registered unless the
//! listener is configured to close them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bach_protocol::ClientId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Entry for a connected host client
pub struct ClientEntry {
    pub peer: SocketAddr,
    pub accepted_at: DateTime<Utc>,
    /// Lines queued for this client's writer task
    sender: mpsc::Sender<String>,
}

impl std::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("peer", &self.peer)
            .field("accepted_at", &self.accepted_at)
            .field("sender_closed", &self.sender.is_closed())
            .finish()
    }
}

/// Snapshot of one registered client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub peer: SocketAddr,
    pub accepted_at: DateTime<Utc>,
}

/// Registry tracking all connected host clients
pub struct ClientRegistry {
    clients: DashMap<ClientId, ClientEntry>,
    next_client_id: AtomicU64,
    /// Raw id of the canonical client, 0 when none
    canonical: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            next_client_id: AtomicU64::new(1),
            canonical: AtomicU64::new(0),
        }
    }

    // ==================== Client Management ====================

    /// Register a new connection; it becomes canonical
    pub fn register(&self, peer: SocketAddr, sender: mpsc::Sender<String>) -> ClientId {
        let id = ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst));

        self.clients.insert(
            id,
            ClientEntry {
                peer,
                accepted_at: Utc::now(),
                sender,
            },
        );
        self.canonical.store(id.0, Ordering::SeqCst);
        debug!(client = %id, %peer, "Registered host client");

        id
    }

    /// Remove a client. Returns `false` if it was already gone.
    pub fn unregister(&self, id: ClientId) -> bool {
        if self.clients.remove(&id).is_none() {
            return false;
        }

        if self.canonical.load(Ordering::SeqCst) == id.0 {
            // Fall back to the newest remaining connection
            let newest = self.clients.iter().map(|e| e.key().0).max().unwrap_or(0);
            self.canonical.store(newest, Ordering::SeqCst);
        }

        debug!(client = %id, "Unregistered host client");
        true
    }

    /// Drop every client except `keep`, closing their writer channels
    pub fn close_all_except(&self, keep: ClientId) -> Vec<ClientId> {
        let stale: Vec<ClientId> = self
            .clients
            .iter()
            .map(|e| *e.key())
            .filter(|id| *id != keep)
            .collect();

        stale.into_iter().filter(|id| self.unregister(*id)).collect()
    }

    pub fn canonical(&self) -> Option<ClientId> {
        match self.canonical.load(Ordering::SeqCst) {
            0 => None,
            raw => Some(ClientId(raw)),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn get(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients.get(&id).map(|entry| ClientInfo {
            id,
            peer: entry.peer,
            accepted_at: entry.accepted_at,
        })
    }

    /// All clients, oldest first
    pub fn clients(&self) -> Vec<ClientInfo> {
        let mut out: Vec<ClientInfo> = self
            .clients
            .iter()
            .map(|e| ClientInfo {
                id: *e.key(),
                peer: e.peer,
                accepted_at: e.accepted_at,
            })
            .collect();
        out.sort_by_key(|c| c.id);
        out
    }

    // ==================== Message Delivery ====================

    /// Queue a line for one client (non-blocking)
    ///
    /// A closed channel means the client is gone and it is unregistered.
    pub fn send_to_client(&self, id: ClientId, line: &str) -> bool {
        let sender = match self.clients.get(&id) {
            Some(entry) => entry.sender.clone(),
            None => return false,
        };

        match sender.try_send(line.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(client = %id, "Host client channel closed, removing");
                self.unregister(id);
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(client = %id, "Host client channel full, dropping line");
                false
            }
        }
    }

    /// Queue a line for every registered client; returns the delivery count
    pub fn broadcast(&self, line: &str) -> usize {
        let ids: Vec<ClientId> = self.clients.iter().map(|e| *e.key()).collect();
        ids.into_iter()
            .filter(|id| self.send_to_client(*id, line))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_assigns_increasing_ids() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let a = registry.register(peer(5000), tx.clone());
        let b = registry.register(peer(5001), tx);
        assert!(b > a);
        assert_eq!(registry.client_count(), 2);
    }

    #[test]
    fn test_newest_is_canonical() {
        let registry = ClientRegistry::new();
        assert!(registry.canonical().is_none());

        let (tx, _rx) = mpsc::channel(4);
        let a = registry.register(peer(5000), tx.clone());
        assert_eq!(registry.canonical(), Some(a));
        let b = registry.register(peer(5001), tx);
        assert_eq!(registry.canonical(), Some(b));
    }

    #[test]
    fn test_unregister_canonical_falls_back_to_newest_remaining() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let a = registry.register(peer(5000), tx.clone());
        let b = registry.register(peer(5001), tx.clone());
        let c = registry.register(peer(5002), tx);

        assert!(registry.unregister(c));
        assert_eq!(registry.canonical(), Some(b));
        assert!(registry.unregister(a));
        assert_eq!(registry.canonical(), Some(b));
        assert!(registry.unregister(b));
        assert!(registry.canonical().is_none());
        assert!(!registry.unregister(b));
    }

    #[test]
    fn test_close_all_except() {
        let registry = ClientRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, _rx_b) = mpsc::channel(4);
        let a = registry.register(peer(5000), tx_a);
        let b = registry.register(peer(5001), tx_b);

        assert_eq!(registry.close_all_except(b), vec![a]);
        assert_eq!(registry.client_count(), 1);
        // Dropping the entry closed the writer channel
        assert!(rx_a.try_recv().is_err());
        assert!(rx_a.is_closed());
    }

    #[test]
    fn test_broadcast_counts_deliveries_and_prunes_closed() {
        let registry = ClientRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, rx_b) = mpsc::channel(4);
        registry.register(peer(5000), tx_a);
        let b = registry.register(peer(5001), tx_b);
        drop(rx_b);

        assert_eq!(registry.broadcast("bach_offline"), 1);
        assert_eq!(rx_a.try_recv().unwrap(), "bach_offline");
        assert!(registry.get(b).is_none());
    }

    #[test]
    fn test_send_to_full_channel() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = registry.register(peer(5000), tx);
        assert!(registry.send_to_client(id, "one"));
        assert!(!registry.send_to_client(id, "two"));
        // Still registered
        assert!(registry.get(id).is_some());
    }

    #[test]
    fn test_clients_sorted_oldest_first() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let a = registry.register(peer(5000), tx.clone());
        let b = registry.register(peer(5001), tx);
        let ids: Vec<ClientId> = registry.clients().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(registry.clients()[1].peer, peer(5001));
    }
}
