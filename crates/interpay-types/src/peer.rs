//! Peer identity and connection state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Opaque peer identifier, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create a new random PeerId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A peer as seen by discovery: identifier plus display name.
///
/// Equality and hashing use the identifier only, so two identities with the
/// same id but different names are the same peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Unique identifier.
    pub id: PeerId,
    /// Human-readable name (usually the device name).
    pub display_name: String,
}

impl PeerIdentity {
    pub fn new(id: impl Into<PeerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerIdentity {}

impl Hash for PeerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Connection state of a peer, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Invitation accepted, link being established.
    Connecting,
    /// Link established; data can flow.
    Connected,
    /// Link gone (terminal).
    NotConnected,
}

impl ConnectionState {
    /// Whether `self -> next` is one of the legal transitions:
    /// `Connecting -> Connected`, `Connecting -> NotConnected`,
    /// `Connected -> NotConnected`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (ConnectionState::Connecting, ConnectionState::Connected)
                | (ConnectionState::Connecting, ConnectionState::NotConnected)
                | (ConnectionState::Connected, ConnectionState::NotConnected)
        )
    }

    /// States a record may start in when a peer is first observed.
    pub fn is_initial(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::NotConnected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::NotConnected => "not_connected",
        };
        f.write_str(s)
    }
}

/// Point-in-time copy of a registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub identity: PeerIdentity,
    pub state: ConnectionState,
    /// When the state was last written.
    pub last_updated: DateTime<Utc>,
}
