//! In-process loopback transport.
//!
//! A [`LoopbackNetwork`] is a hub shared by any number of
//! [`LoopbackTransport`] endpoints in the same process. Every advertiser is
//! paired with every browser of the same service type, invitations travel
//! through the target's session, and data is handed straight to the target's
//! event sink. Used by the integration tests and the CLI demo.

use crate::transport::{SendMode, Transport, TransportError, TransportEventSink};
use async_trait::async_trait;
use interpay_types::peer::{ConnectionState, PeerId, PeerIdentity};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

type LinkKey = (PeerId, PeerId);

fn link_key(a: &PeerId, b: &PeerId) -> LinkKey {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Debug)]
struct Endpoint {
    identity: PeerIdentity,
    service_type: String,
    sink: Option<TransportEventSink>,
    advertising: bool,
    browsing: bool,
}

impl Endpoint {
    fn emit_state(&self, peer: &PeerIdentity, state: ConnectionState) {
        if let Some(sink) = &self.sink {
            sink.state_changed(peer.clone(), state);
        }
    }
}

#[derive(Debug, Default)]
struct Hub {
    endpoints: HashMap<PeerId, Endpoint>,
    links: HashSet<LinkKey>,
    pending: HashSet<LinkKey>,
}

impl Hub {
    /// Endpoints of `service_type` other than `local` matching `filter`.
    fn others<'a>(
        &'a self,
        local: &'a PeerId,
        service_type: &'a str,
        filter: impl Fn(&Endpoint) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Endpoint> + 'a {
        self.endpoints
            .values()
            .filter(move |e| &e.identity.id != local && e.service_type == service_type)
            .filter(move |e| filter(*e))
    }
}

/// Shared in-process medium.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint with a fresh peer id.
    pub fn endpoint(
        &self,
        display_name: impl Into<String>,
        service_type: impl Into<String>,
    ) -> Arc<LoopbackTransport> {
        let identity = PeerIdentity::new(PeerId::new(), display_name);
        self.lock().endpoints.insert(
            identity.id.clone(),
            Endpoint {
                identity: identity.clone(),
                service_type: service_type.into(),
                sink: None,
                advertising: false,
                browsing: false,
            },
        );
        Arc::new(LoopbackTransport {
            network: self.clone(),
            local: identity,
        })
    }

    /// Number of established links.
    pub fn link_count(&self) -> usize {
        self.lock().links.len()
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One peer's view of a [`LoopbackNetwork`].
#[derive(Debug)]
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    local: PeerIdentity,
}

impl LoopbackTransport {
    /// The identity other endpoints see for this one.
    pub fn identity(&self) -> &PeerIdentity {
        &self.local
    }

    /// Drop the link to `peer`, reporting `NotConnected` on both sides.
    pub fn disconnect(&self, peer: &PeerId) -> bool {
        let mut hub = self.network.lock();
        if !hub.links.remove(&link_key(&self.local.id, peer)) {
            return false;
        }
        if let (Some(me), Some(other)) = (hub.endpoints.get(&self.local.id), hub.endpoints.get(peer)) {
            me.emit_state(&other.identity, ConnectionState::NotConnected);
            other.emit_state(&me.identity, ConnectionState::NotConnected);
        }
        debug!(local = %self.local, peer = %peer, "Loopback link dropped");
        true
    }

    fn with_self<T>(&self, f: impl FnOnce(&mut Hub) -> T) -> Result<T, TransportError> {
        let mut hub = self.network.lock();
        if !hub.endpoints.contains_key(&self.local.id) {
            return Err(TransportError::Stopped);
        }
        Ok(f(&mut hub))
    }

    /// Resolve an invitation that is no longer pending.
    fn finish_invite(&self, peer: &PeerIdentity, accepted: bool) {
        let mut hub = self.network.lock();
        let key = link_key(&self.local.id, &peer.id);
        hub.pending.remove(&key);
        if accepted {
            hub.links.insert(key);
        }
        let (Some(me), Some(other)) = (hub.endpoints.get(&self.local.id), hub.endpoints.get(&peer.id))
        else {
            return;
        };
        if accepted {
            other.emit_state(&me.identity, ConnectionState::Connecting);
            other.emit_state(&me.identity, ConnectionState::Connected);
            me.emit_state(&other.identity, ConnectionState::Connected);
        } else {
            me.emit_state(&other.identity, ConnectionState::NotConnected);
        }
    }
}

/// Clears a pending invitation if `connect` is dropped before it resolves.
struct PendingInvite<'a> {
    transport: &'a LoopbackTransport,
    peer: &'a PeerIdentity,
    armed: bool,
}

impl PendingInvite<'_> {
    fn finish(mut self, accepted: bool) {
        self.armed = false;
        self.transport.finish_invite(self.peer, accepted);
    }
}

impl Drop for PendingInvite<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.transport.finish_invite(self.peer, false);
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn set_event_sink(&self, sink: TransportEventSink) {
        if let Some(me) = self.network.lock().endpoints.get_mut(&self.local.id) {
            me.sink = Some(sink);
        }
    }

    async fn start_advertising(&self) -> Result<(), TransportError> {
        self.with_self(|hub| {
            let Some(me) = hub.endpoints.get_mut(&self.local.id) else {
                return;
            };
            me.advertising = true;
            let service = me.service_type.clone();
            for browser in hub.others(&self.local.id, &service, |e| e.browsing) {
                if let Some(sink) = &browser.sink {
                    sink.peer_found(self.local.clone());
                }
            }
        })
    }

    async fn stop_advertising(&self) -> Result<(), TransportError> {
        self.with_self(|hub| {
            let Some(me) = hub.endpoints.get_mut(&self.local.id) else {
                return;
            };
            if !std::mem::replace(&mut me.advertising, false) {
                return;
            }
            let service = me.service_type.clone();
            for browser in hub.others(&self.local.id, &service, |e| e.browsing) {
                if let Some(sink) = &browser.sink {
                    sink.peer_lost(self.local.clone());
                }
            }
        })
    }

    async fn start_browsing(&self) -> Result<(), TransportError> {
        self.with_self(|hub| {
            let Some(me) = hub.endpoints.get_mut(&self.local.id) else {
                return;
            };
            me.browsing = true;
            let (service, sink) = (me.service_type.clone(), me.sink.clone());
            let Some(sink) = sink else {
                return;
            };
            for advertiser in hub.others(&self.local.id, &service, |e| e.advertising) {
                sink.peer_found(advertiser.identity.clone());
            }
        })
    }

    async fn stop_browsing(&self) -> Result<(), TransportError> {
        self.with_self(|hub| {
            if let Some(me) = hub.endpoints.get_mut(&self.local.id) {
                me.browsing = false;
            }
        })
    }

    async fn connect(&self, peer: &PeerIdentity, timeout: Duration) -> Result<(), TransportError> {
        let answer = {
            let mut hub = self.network.lock();
            let key = link_key(&self.local.id, &peer.id);
            if hub.links.contains(&key) || hub.pending.contains(&key) {
                return Ok(());
            }
            let (Some(me), Some(target)) =
                (hub.endpoints.get(&self.local.id), hub.endpoints.get(&peer.id))
            else {
                return Err(TransportError::Unreachable(peer.display_name.clone()));
            };
            let Some(target_sink) = target.sink.clone().filter(|_| target.advertising) else {
                return Err(TransportError::Unreachable(peer.display_name.clone()));
            };
            me.emit_state(&target.identity, ConnectionState::Connecting);
            let answer = target_sink.invitation_received(me.identity.clone());
            hub.pending.insert(key);
            answer
        };

        let pending = PendingInvite {
            transport: self,
            peer,
            armed: true,
        };
        match tokio::time::timeout(timeout, answer).await {
            Ok(Ok(true)) => {
                pending.finish(true);
                Ok(())
            }
            Ok(Ok(false)) | Ok(Err(_)) => {
                pending.finish(false);
                Err(TransportError::Declined(peer.display_name.clone()))
            }
            Err(_) => {
                pending.finish(false);
                Err(TransportError::Timeout(peer.display_name.clone()))
            }
        }
    }

    async fn send(
        &self,
        data: &[u8],
        to: &[PeerIdentity],
        mode: SendMode,
    ) -> Result<(), TransportError> {
        let hub = self.network.lock();
        let mut sinks = Vec::with_capacity(to.len());
        for peer in to {
            let linked = hub.links.contains(&link_key(&self.local.id, &peer.id));
            match hub.endpoints.get(&peer.id).and_then(|e| e.sink.clone()) {
                Some(sink) if linked => sinks.push((peer, sink)),
                _ if mode == SendMode::Reliable => {
                    return Err(TransportError::Unreachable(peer.display_name.clone()));
                }
                _ => debug!(peer = %peer, "Unreliable send skipped unlinked peer"),
            }
        }
        drop(hub);

        for (peer, sink) in sinks {
            if !sink.data_received(self.local.clone(), data.to_vec()) && mode == SendMode::Reliable {
                return Err(TransportError::Unreachable(peer.display_name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SessionCommand, TransportEvent};
    use tokio::sync::mpsc;

    fn attach(
        transport: &LoopbackTransport,
    ) -> mpsc::UnboundedReceiver<SessionCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        transport.set_event_sink(TransportEventSink::new(tx));
        rx
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionCommand>) -> TransportEvent {
        match rx.try_recv() {
            Ok(SessionCommand::Event(event)) => event,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_aborted_connect_clears_pending_invitation() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint("A", "svc");
        let b = net.endpoint("B", "svc");
        let _rx_a = attach(&a);
        let mut rx_b = attach(&b);
        b.start_advertising().await.unwrap();

        let caller = a.clone();
        let target = b.identity().clone();
        let handle =
            tokio::spawn(async move { caller.connect(&target, Duration::from_secs(10)).await });

        // Keep the first invitation unanswered but alive.
        let mut first = None;
        for _ in 0..100 {
            if let Ok(SessionCommand::Event(event)) = rx_b.try_recv() {
                first = Some(event);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(
            first,
            Some(TransportEvent::InvitationReceived { .. })
        ));

        handle.abort();
        let _ = handle.await;

        // A fresh invitation goes out instead of short-circuiting on the stale one.
        let err = a
            .connect(b.identity(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert_eq!(net.link_count(), 0);
    }

    #[tokio::test]
    async fn test_browser_finds_advertiser() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint("A", "svc");
        let b = net.endpoint("B", "svc");
        let other = net.endpoint("X", "other-svc");
        let _rx_a = attach(&a);
        let mut rx_b = attach(&b);
        let _rx_x = attach(&other);

        a.start_advertising().await.unwrap();
        other.start_advertising().await.unwrap();
        b.start_browsing().await.unwrap();

        match next_event(&mut rx_b) {
            TransportEvent::PeerFound(p) => assert_eq!(&p, a.identity()),
            e => panic!("unexpected {e:?}"),
        }
        assert!(rx_b.try_recv().is_err());

        a.stop_advertising().await.unwrap();
        assert!(matches!(next_event(&mut rx_b), TransportEvent::PeerLost(_)));
    }

    #[tokio::test]
    async fn test_connect_to_silent_peer_is_unreachable() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint("A", "svc");
        let b = net.endpoint("B", "svc");
        let _rx_a = attach(&a);
        let _rx_b = attach(&b);

        let err = a
            .connect(b.identity(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Unreachable("B".to_string()));
    }

    #[tokio::test]
    async fn test_unanswered_invite_times_out() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint("A", "svc");
        let b = net.endpoint("B", "svc");
        let mut rx_a = attach(&a);
        let _rx_b = attach(&b);
        b.start_advertising().await.unwrap();

        let err = a
            .connect(b.identity(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout("B".to_string()));
        assert!(matches!(
            next_event(&mut rx_a),
            TransportEvent::StateChanged { state: ConnectionState::Connecting, .. }
        ));
        assert!(matches!(
            next_event(&mut rx_a),
            TransportEvent::StateChanged { state: ConnectionState::NotConnected, .. }
        ));
        assert_eq!(net.link_count(), 0);
    }

    #[tokio::test]
    async fn test_send_requires_link() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint("A", "svc");
        let b = net.endpoint("B", "svc");
        let _rx_a = attach(&a);
        let mut rx_b = attach(&b);

        let err = a
            .send(b"hi", &[b.identity().clone()], SendMode::Reliable)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Unreachable("B".to_string()));

        a.send(b"hi", &[b.identity().clone()], SendMode::Unreliable)
            .await
            .unwrap();
        assert!(rx_b.try_recv().is_err());
        assert!(!a.disconnect(&b.identity().id));
    }
}
