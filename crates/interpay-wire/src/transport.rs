//! Transport capability — the local-network medium the session runs on.
//!
//! The session core does not implement discovery or links itself. A
//! [`Transport`] exposes advertise/browse/connect/send primitives and reports
//! everything that happens on the medium as [`TransportEvent`]s through a
//! [`TransportEventSink`]. The sink is synchronous and never blocks, so a
//! transport may emit from any thread, including non-async callbacks.

use async_trait::async_trait;
use interpay_types::peer::{ConnectionState, PeerIdentity};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Errors reported by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer cannot be reached (not connected, out of range, gone).
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    /// The invitation was declined by the remote side.
    #[error("invitation declined by {0}")]
    Declined(String),
    /// The invitation was not answered in time.
    #[error("invitation to {0} timed out")]
    Timeout(String),
    /// The transport itself is not running.
    #[error("transport stopped")]
    Stopped,
}

/// Delivery mode for [`Transport::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Arrives intact or the send reports failure.
    #[default]
    Reliable,
    /// Best effort; may be silently lost.
    Unreliable,
}

/// Something that happened on the medium.
#[derive(Debug)]
pub enum TransportEvent {
    /// A peer advertising our service came into range.
    PeerFound(PeerIdentity),
    /// A peer stopped being discoverable. Says nothing about its connection.
    PeerLost(PeerIdentity),
    /// A peer wants to join our session.
    InvitationReceived {
        from: PeerIdentity,
        responder: InvitationResponder,
    },
    /// A peer's link changed state.
    StateChanged {
        peer: PeerIdentity,
        state: ConnectionState,
    },
    /// A peer sent us a message.
    DataReceived { from: PeerIdentity, data: Vec<u8> },
}

impl TransportEvent {
    /// The peer this event is about.
    pub fn peer(&self) -> &PeerIdentity {
        match self {
            TransportEvent::PeerFound(p) | TransportEvent::PeerLost(p) => p,
            TransportEvent::InvitationReceived { from, .. } => from,
            TransportEvent::StateChanged { peer, .. } => peer,
            TransportEvent::DataReceived { from, .. } => from,
        }
    }
}

/// One-shot answer to an incoming invitation.
///
/// Answering consumes the responder. Dropping it without answering counts
/// as a decline on the inviting side.
#[derive(Debug)]
pub struct InvitationResponder {
    tx: oneshot::Sender<bool>,
}

impl InvitationResponder {
    /// Create a responder and the receiver the transport waits on.
    pub fn pair() -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Accept or decline the invitation.
    pub fn respond(self, accept: bool) {
        if self.tx.send(accept).is_err() {
            debug!("Invitation answered after the inviter gave up");
        }
    }
}

/// Commands consumed by the session worker.
///
/// Transport events and internal barriers share one queue so that a barrier
/// completes only after everything enqueued before it has been applied.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Event(TransportEvent),
    Flush(oneshot::Sender<()>),
}

/// Cloneable, thread-safe emitter of transport events.
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl TransportEventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self { tx }
    }

    /// Queue an event for the session. Returns `false` once the session has
    /// shut down and the event was discarded.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send(SessionCommand::Event(event)).is_ok()
    }

    pub fn peer_found(&self, peer: PeerIdentity) -> bool {
        self.emit(TransportEvent::PeerFound(peer))
    }

    pub fn peer_lost(&self, peer: PeerIdentity) -> bool {
        self.emit(TransportEvent::PeerLost(peer))
    }

    pub fn state_changed(&self, peer: PeerIdentity, state: ConnectionState) -> bool {
        self.emit(TransportEvent::StateChanged { peer, state })
    }

    pub fn data_received(&self, from: PeerIdentity, data: Vec<u8>) -> bool {
        self.emit(TransportEvent::DataReceived { from, data })
    }

    /// Queue an invitation; the returned receiver yields the session's answer.
    pub fn invitation_received(&self, from: PeerIdentity) -> oneshot::Receiver<bool> {
        let (responder, rx) = InvitationResponder::pair();
        // If the session is gone the responder is dropped with the command,
        // which the receiver observes as a decline.
        self.emit(TransportEvent::InvitationReceived { from, responder });
        rx
    }

    /// Whether the session on the other end is still running.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A local-network medium: discovery plus reliable peer links.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Hand the transport the sink it reports events to. Called once,
    /// before any other method.
    fn set_event_sink(&self, sink: TransportEventSink);

    /// Make the local peer discoverable.
    async fn start_advertising(&self) -> Result<(), TransportError>;

    async fn stop_advertising(&self) -> Result<(), TransportError>;

    /// Start looking for other peers (results arrive as `PeerFound`).
    async fn start_browsing(&self) -> Result<(), TransportError>;

    async fn stop_browsing(&self) -> Result<(), TransportError>;

    /// Invite `peer` into the session. Resolves once the invitation has been
    /// answered or `timeout` has elapsed; the link itself is reported
    /// through `StateChanged`.
    async fn connect(&self, peer: &PeerIdentity, timeout: Duration) -> Result<(), TransportError>;

    /// Deliver `data` to every peer in `to`. With [`SendMode::Reliable`] the
    /// call fails if any target cannot be reached.
    async fn send(
        &self,
        data: &[u8],
        to: &[PeerIdentity],
        mode: SendMode,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responder_delivers_answer() {
        let (responder, rx) = InvitationResponder::pair();
        responder.respond(true);
        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_responder_is_observed() {
        let (responder, rx) = InvitationResponder::pair();
        drop(responder);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_sink_reports_closed_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TransportEventSink::new(tx);
        assert!(sink.peer_found(PeerIdentity::new("p1", "Ana")));
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.peer_lost(PeerIdentity::new("p1", "Ana")));

        let answer = sink.invitation_received(PeerIdentity::new("p1", "Ana"));
        assert!(answer.await.is_err());
    }

    #[test]
    fn test_invitation_dropped_with_session_reads_as_decline() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TransportEventSink::new(tx);
        let answer = sink.invitation_received(PeerIdentity::new("p1", "Ana"));
        // Dropping the session side drops the queued responder with it.
        drop(rx);
        tokio_test::assert_err!(tokio_test::block_on(answer));
    }

    #[test]
    fn test_event_peer_accessor() {
        let peer = PeerIdentity::new("p1", "Ana");
        let event = TransportEvent::DataReceived {
            from: peer.clone(),
            data: vec![],
        };
        assert_eq!(event.peer(), &peer);
    }
}
