//! Session manager — owns the lifecycle of every peer link.
//!
//! Transport events arrive on arbitrary threads and in arbitrary order. They
//! are queued on one channel and applied by a single worker task, which is
//! the only writer of the [`PeerRegistry`]. That makes every state change for
//! a peer deterministic: the last event applied wins, and events for the same
//! peer are applied in arrival order.
//!
//! Per-peer state machine:
//!
//! ```text
//!   (first seen) ──► Connecting ──► Connected
//!                        │              │
//!                        └──► NotConnected ◄┘   (record removed)
//! ```
//!
//! A peer seen again after `NotConnected` starts over with a fresh record.

use crate::policy::AcceptPolicy;
use crate::registry::PeerRegistry;
use crate::router::{DispatchOutcome, MessageRouter};
use crate::transport::{
    SendMode, SessionCommand, Transport, TransportError, TransportEvent, TransportEventSink,
};
use interpay_types::config::SessionConfig;
use interpay_types::error::{InterpayError, InterpayResult};
use interpay_types::peer::{ConnectionState, PeerId, PeerIdentity, PeerRecord};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// How a state-change event affected the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// First observation of the peer; a record was created.
    Inserted,
    /// The record moved to a new state.
    Updated,
    /// The same state was reported again; only the timestamp moved.
    Refreshed,
    /// The peer reached `NotConnected` and its record was dropped.
    Removed,
    /// `NotConnected` for a peer we had no record of; nothing to do.
    Ignored,
}

/// Apply one reported state to the registry, enforcing the state machine.
///
/// Must only be called from a single writer; the read of the current state
/// and the write that follows are not atomic with respect to other writers.
pub(crate) fn apply_transition(
    registry: &PeerRegistry,
    peer: PeerIdentity,
    next: ConnectionState,
) -> InterpayResult<TransitionOutcome> {
    match registry.state_of(&peer.id) {
        None if next.is_initial() => {
            registry.upsert(peer, next);
            Ok(TransitionOutcome::Inserted)
        }
        None => Ok(TransitionOutcome::Ignored),
        Some(current) if current == next => {
            registry.upsert(peer, next);
            Ok(TransitionOutcome::Refreshed)
        }
        Some(current) if current.can_transition_to(next) => {
            if next.is_terminal() {
                registry.upsert(peer.clone(), next);
                registry.remove(&peer.id);
                Ok(TransitionOutcome::Removed)
            } else {
                registry.upsert(peer, next);
                Ok(TransitionOutcome::Updated)
            }
        }
        Some(current) => Err(InterpayError::InvalidStateTransition {
            peer: peer.to_string(),
            from: current.to_string(),
            to: next.to_string(),
        }),
    }
}

/// Counters describing what the session worker has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Transport events applied by the worker.
    pub events_applied: u64,
    /// State changes rejected because they broke the state machine.
    pub invalid_transitions: u64,
    /// Inbound messages a handler accepted.
    pub messages_handled: u64,
    /// Inbound messages dropped (unknown type, undecodable, handler error).
    pub messages_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events_applied: AtomicU64,
    invalid_transitions: AtomicU64,
    messages_handled: AtomicU64,
    messages_dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            events_applied: self.events_applied.load(Ordering::Relaxed),
            invalid_transitions: self.invalid_transitions.load(Ordering::Relaxed),
            messages_handled: self.messages_handled.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Mediates between the transport and the peer registry.
pub struct SessionManager {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    router: Arc<MessageRouter>,
    registry: PeerRegistry,
    commands: mpsc::UnboundedSender<SessionCommand>,
    peers_rx: watch::Receiver<Vec<PeerRecord>>,
    peers_tx: Arc<watch::Sender<Vec<PeerRecord>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    stopped: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl SessionManager {
    /// Create the session and spawn its worker.
    ///
    /// Registers the event sink with the transport but does not start
    /// advertising or browsing; call [`SessionManager::start`] once every
    /// message handler is registered on `router`. Must be called from within
    /// a Tokio runtime.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn AcceptPolicy>,
        router: Arc<MessageRouter>,
    ) -> Arc<Self> {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (peers_tx, peers_rx) = watch::channel(Vec::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let peers_tx = Arc::new(peers_tx);
        let registry = PeerRegistry::new();
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            registry: registry.clone(),
            router: Arc::clone(&router),
            transport: Arc::clone(&transport),
            policy,
            peers_tx: Arc::clone(&peers_tx),
            counters: Arc::clone(&counters),
            invite_timeout: Duration::from_secs(config.invite_timeout_secs),
        };
        let handle = tokio::spawn(worker.run(commands_rx, shutdown_rx));

        transport.set_event_sink(TransportEventSink::new(commands.clone()));

        Arc::new(Self {
            config,
            transport,
            router,
            registry,
            commands,
            peers_rx,
            peers_tx,
            shutdown_tx,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
            counters,
        })
    }

    /// Start advertising the local peer and browsing for others.
    ///
    /// Calling it again while running is a no-op.
    pub async fn start(&self) -> InterpayResult<()> {
        if self.is_shut_down() {
            return Err(InterpayError::ShuttingDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!(
            service = %self.config.service_type,
            name = %self.config.display_name,
            "Starting peer session"
        );
        self.transport
            .start_advertising()
            .await
            .map_err(|e| InterpayError::Transport(format!("start advertising: {e}")))?;
        self.transport
            .start_browsing()
            .await
            .map_err(|e| InterpayError::Transport(format!("start browsing: {e}")))?;
        Ok(())
    }

    /// Tear the session down: stop advertising and browsing, stop the worker
    /// and release every peer record. Invitations still in flight are
    /// aborted before this returns.
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(name = %self.config.display_name, "Shutting down peer session");

        if self.started.load(Ordering::SeqCst) {
            if let Err(e) = self.transport.stop_advertising().await {
                warn!(error = %e, "Failed to stop advertising");
            }
            if let Err(e) = self.transport.stop_browsing().await {
                warn!(error = %e, "Failed to stop browsing");
            }
        }

        let _ = self.shutdown_tx.send(true);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                error!(error = %e, "Session worker ended abnormally");
            }
        }

        self.registry.clear();
        self.peers_tx.send_replace(Vec::new());
    }

    pub fn is_shut_down(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The router inbound messages are dispatched through.
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Point-in-time copy of every known peer.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.registry.snapshot()
    }

    /// Current record for one peer.
    pub fn peer(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.registry.get(peer_id)
    }

    /// Every peer currently `Connected`.
    pub fn connected_peers(&self) -> Vec<PeerIdentity> {
        self.registry.connected_peers()
    }

    /// Push-style peer list: a new snapshot is published after every change.
    pub fn observe_peers(&self) -> watch::Receiver<Vec<PeerRecord>> {
        self.peers_rx.clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Wait until every event queued before this call has been applied.
    pub async fn flush(&self) -> InterpayResult<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Flush(tx))
            .map_err(|_| InterpayError::ShuttingDown)?;
        rx.await.map_err(|_| InterpayError::ShuttingDown)
    }

    /// Invite a peer explicitly (discovered peers are invited automatically).
    pub async fn invite(&self, peer: &PeerIdentity) -> InterpayResult<()> {
        if self.is_shut_down() {
            return Err(InterpayError::ShuttingDown);
        }
        invite_peer(
            self.transport.as_ref(),
            peer,
            Duration::from_secs(self.config.invite_timeout_secs),
        )
        .await
    }

    /// Reliably send `data` to every peer in `to`.
    ///
    /// No lock is held while the transport works, so a slow peer never
    /// stalls registry updates. Failures are not retried here.
    pub async fn send(&self, data: &[u8], to: &[PeerIdentity]) -> InterpayResult<()> {
        if self.is_shut_down() {
            return Err(InterpayError::ShuttingDown);
        }
        if to.is_empty() {
            return Err(InterpayError::NoConnectedPeers);
        }

        debug!(peers = to.len(), bytes = data.len(), "Sending message");
        self.transport
            .send(data, to, SendMode::Reliable)
            .await
            .map_err(|e| unreachable_error(to, &e))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // Without an explicit shutdown the worker would outlive the session.
        let _ = self.shutdown_tx.send(true);
    }
}

fn unreachable_error(peers: &[PeerIdentity], err: &TransportError) -> InterpayError {
    let names: Vec<&str> = peers.iter().map(|p| p.display_name.as_str()).collect();
    InterpayError::PeerUnreachable {
        peer: names.join(", "),
        reason: err.to_string(),
    }
}

async fn invite_peer(
    transport: &dyn Transport,
    peer: &PeerIdentity,
    timeout: Duration,
) -> InterpayResult<()> {
    transport
        .connect(peer, timeout)
        .await
        .map_err(|e| unreachable_error(std::slice::from_ref(peer), &e))
}

/// The single writer of the registry.
struct Worker {
    registry: PeerRegistry,
    router: Arc<MessageRouter>,
    transport: Arc<dyn Transport>,
    policy: Arc<dyn AcceptPolicy>,
    peers_tx: Arc<watch::Sender<Vec<PeerRecord>>>,
    counters: Arc<Counters>,
    invite_timeout: Duration,
}

impl Worker {
    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut invites = JoinSet::new();
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(SessionCommand::Event(event)) => self.handle_event(event, &mut invites),
                        Some(SessionCommand::Flush(done)) => {
                            let _ = done.send(());
                        }
                        None => break,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(_) = invites.join_next(), if !invites.is_empty() => {}
            }
        }
        if !invites.is_empty() {
            debug!(pending = invites.len(), "Aborting pending invitations");
        }
        invites.shutdown().await;
        debug!("Session worker stopped");
    }

    fn handle_event(&self, event: TransportEvent, invites: &mut JoinSet<()>) {
        self.counters.events_applied.fetch_add(1, Ordering::Relaxed);
        match event {
            TransportEvent::PeerFound(peer) => self.on_peer_found(peer, invites),
            TransportEvent::PeerLost(peer) => {
                // A lost peer may still be connected; only StateChanged ends a link.
                info!(peer = %peer, "Peer left discovery range");
            }
            TransportEvent::InvitationReceived { from, responder } => {
                let accept = self.policy.should_accept_invitation(&from);
                if accept {
                    info!(peer = %from, "Accepting invitation");
                } else {
                    warn!(peer = %from, "Declining invitation from untrusted peer");
                }
                responder.respond(accept);
            }
            TransportEvent::StateChanged { peer, state } => self.on_state_changed(peer, state),
            TransportEvent::DataReceived { from, data } => {
                match self.router.dispatch_bytes(&data, &from) {
                    DispatchOutcome::Handled => {
                        self.counters.messages_handled.fetch_add(1, Ordering::Relaxed);
                    }
                    DispatchOutcome::Unhandled | DispatchOutcome::Failed => {
                        self.counters.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    fn on_peer_found(&self, peer: PeerIdentity, invites: &mut JoinSet<()>) {
        if !self.policy.should_invite(&peer) {
            info!(peer = %peer, "Discovered untrusted peer, not inviting");
            return;
        }
        if let Some(state) = self.registry.state_of(&peer.id) {
            debug!(peer = %peer, state = %state, "Discovered peer already in session");
            return;
        }

        info!(peer = %peer, "Peer found, inviting");
        let transport = Arc::clone(&self.transport);
        let timeout = self.invite_timeout;
        invites.spawn(async move {
            if let Err(e) = invite_peer(transport.as_ref(), &peer, timeout).await {
                warn!(peer = %peer, error = %e, "Invitation failed");
            }
        });
    }

    fn on_state_changed(&self, peer: PeerIdentity, state: ConnectionState) {
        let label = peer.to_string();
        match apply_transition(&self.registry, peer, state) {
            Ok(TransitionOutcome::Ignored) => {
                debug!(peer = %label, "Disconnect for unknown peer ignored");
            }
            Ok(outcome) => {
                match outcome {
                    TransitionOutcome::Removed => info!(peer = %label, "Peer disconnected"),
                    TransitionOutcome::Refreshed => {
                        debug!(peer = %label, state = %state, "Peer state refreshed")
                    }
                    _ => info!(peer = %label, state = %state, "Peer state changed"),
                }
                self.peers_tx.send_replace(self.registry.snapshot());
            }
            Err(e) => {
                self.counters
                    .invalid_transitions
                    .fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Rejected state change; peer record left unchanged");
            }
        }
    }
}
