//! Invite/accept policy.
//!
//! The session asks its [`AcceptPolicy`] before inviting a discovered peer
//! and before accepting an incoming invitation. The default, [`AcceptAll`],
//! trusts everyone on the local network: any nearby device running the
//! service can join the session. [`AllowList`] restricts both directions to
//! named peers.

use interpay_types::config::TrustConfig;
use interpay_types::peer::PeerIdentity;
use std::collections::HashSet;
use std::sync::Arc;

/// Decides which peers the session connects with.
pub trait AcceptPolicy: Send + Sync {
    /// Whether to send an invitation to a freshly discovered peer.
    fn should_invite(&self, peer: &PeerIdentity) -> bool {
        self.should_accept_invitation(peer)
    }

    /// Whether to accept an invitation from `peer`.
    fn should_accept_invitation(&self, peer: &PeerIdentity) -> bool;
}

/// Invite and accept every peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AcceptPolicy for AcceptAll {
    fn should_invite(&self, _peer: &PeerIdentity) -> bool {
        true
    }

    fn should_accept_invitation(&self, _peer: &PeerIdentity) -> bool {
        true
    }
}

/// Only invite and accept peers whose id or display name is listed.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, peer: &PeerIdentity) -> bool {
        self.entries.contains(&peer.id.0) || self.entries.contains(&peer.display_name)
    }
}

impl AcceptPolicy for AllowList {
    fn should_accept_invitation(&self, peer: &PeerIdentity) -> bool {
        self.allows(peer)
    }
}

/// Build the policy described by the trust configuration.
///
/// A non-empty allow list always wins. Otherwise `auto_accept = true` trusts
/// everyone and `auto_accept = false` trusts no one.
pub fn policy_from_config(trust: &TrustConfig) -> Arc<dyn AcceptPolicy> {
    if !trust.allow_list.is_empty() {
        Arc::new(AllowList::new(trust.allow_list.iter().cloned()))
    } else if trust.auto_accept {
        Arc::new(AcceptAll)
    } else {
        Arc::new(AllowList::default())
    }
}
