//! Peer registry — tracks known peers and their connection state.
//!
//! The [`PeerRegistry`] is a thread-safe table keyed by peer id. Every
//! mutation goes through one exclusive lock; readers only ever receive
//! cloned [`PeerRecord`]s, so no caller can observe a half-written entry.

use chrono::Utc;
use interpay_types::peer::{ConnectionState, PeerId, PeerIdentity, PeerRecord};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe registry of all known peers.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    peers: Arc<RwLock<HashMap<PeerId, PeerRecord>>>,
}

impl PeerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or update a peer's record, stamping the update time.
    ///
    /// The identity is replaced as well, so a peer that changed its display
    /// name shows the latest one.
    pub fn upsert(&self, identity: PeerIdentity, state: ConnectionState) {
        let record = PeerRecord {
            identity,
            state,
            last_updated: Utc::now(),
        };
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.insert(record.identity.id.clone(), record);
    }

    /// Remove a peer entirely.
    pub fn remove(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.remove(peer_id)
    }

    /// Point-in-time copy of every record, ordered by display name then id.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = {
            let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
            peers.values().cloned().collect()
        };
        records.sort_by(|a, b| {
            a.identity
                .display_name
                .cmp(&b.identity.display_name)
                .then_with(|| a.identity.id.cmp(&b.identity.id))
        });
        records
    }

    /// Get a snapshot of a specific peer.
    pub fn get(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.get(peer_id).cloned()
    }

    /// Current state of a peer, if it is known.
    pub fn state_of(&self, peer_id: &PeerId) -> Option<ConnectionState> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.get(peer_id).map(|r| r.state)
    }

    /// Identities of every peer currently `Connected`, in snapshot order.
    pub fn connected_peers(&self) -> Vec<PeerIdentity> {
        self.snapshot()
            .into_iter()
            .filter(|r| r.state == ConnectionState::Connected)
            .map(|r| r.identity)
            .collect()
    }

    /// Number of connected peers.
    pub fn connected_count(&self) -> usize {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .values()
            .filter(|p| p.state == ConnectionState::Connected)
            .count()
    }

    /// Total number of peers (any state).
    pub fn total_count(&self) -> usize {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.len()
    }

    /// Drop every record.
    pub fn clear(&self) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.clear();
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
