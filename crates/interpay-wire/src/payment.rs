//! Payment-request workflow on top of the session: build and send requests
//! to connected customers, and surface requests received from a merchant.

use crate::message::{encode_payload, MessageEnvelope, WirePayload, PAYMENT_REQUEST_TYPE};
use crate::router::MessageHandler;
use crate::session::SessionManager;
use interpay_types::error::{InterpayError, InterpayResult};
use interpay_types::payment::{CurrencyCode, PaymentRequest, RequestId};
use interpay_types::peer::{PeerId, PeerIdentity};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the broadcast channel behind [`PaymentRequestService::subscribe`].
const INBOX_CHANNEL_CAPACITY: usize = 64;

/// A payment request together with the peer it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPaymentRequest {
    pub request: PaymentRequest,
    pub from: PeerIdentity,
}

/// Callback invoked for every received payment request.
pub type PaymentRequestCallback = Arc<dyn Fn(&PaymentRequest, &PeerIdentity) + Send + Sync>;

/// Bounded memory of recently seen (sender, request id) pairs.
#[derive(Debug)]
struct RecentRequests {
    capacity: usize,
    order: VecDeque<(PeerId, RequestId)>,
    seen: HashSet<(PeerId, RequestId)>,
}

impl RecentRequests {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Record a pair. Returns `false` if it was already remembered.
    fn insert(&mut self, from: &PeerId, id: RequestId) -> bool {
        if self.capacity == 0 {
            return true;
        }
        let key = (from.clone(), id);
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        true
    }
}

/// Receiving side: registered on the router under `payment_request`.
struct Inbox {
    listeners: RwLock<Vec<PaymentRequestCallback>>,
    events: broadcast::Sender<ReceivedPaymentRequest>,
    recent: Mutex<RecentRequests>,
}

impl MessageHandler for Inbox {
    fn handle(&self, envelope: &MessageEnvelope, from: &PeerIdentity) -> InterpayResult<()> {
        let request = match WirePayload::from_envelope(envelope)? {
            WirePayload::PaymentRequest(request) => request,
        };

        let fresh = self
            .recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(&from.id, request.id());
        if !fresh {
            debug!(request_id = %request.id(), peer = %from, "Dropping resent payment request");
            return Ok(());
        }

        info!(
            request_id = %request.id(),
            peer = %from,
            amount = request.amount(),
            currency = %request.currency(),
            "Payment request received"
        );

        // Clone the list so a listener may register another without deadlocking.
        let listeners: Vec<PaymentRequestCallback> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in &listeners {
            listener(&request, from);
        }

        // No subscribers is fine; callbacks may be the only consumer.
        let _ = self.events.send(ReceivedPaymentRequest {
            request,
            from: from.clone(),
        });
        Ok(())
    }
}

/// Sends and receives payment requests over a [`SessionManager`].
pub struct PaymentRequestService {
    session: Arc<SessionManager>,
    inbox: Arc<Inbox>,
}

impl PaymentRequestService {
    /// Create the service and register its handler on the session's router.
    ///
    /// Build it before [`SessionManager::start`], otherwise requests arriving
    /// in between are dropped as unknown.
    pub fn new(session: Arc<SessionManager>) -> Self {
        let (events, _) = broadcast::channel(INBOX_CHANNEL_CAPACITY);
        let inbox = Arc::new(Inbox {
            listeners: RwLock::new(Vec::new()),
            events,
            recent: Mutex::new(RecentRequests::new(session.config().dedup_window)),
        });
        session
            .router()
            .register(PAYMENT_REQUEST_TYPE, inbox.clone() as Arc<dyn MessageHandler>);
        Self { session, inbox }
    }

    /// Send a payment request to every connected peer.
    pub async fn send_payment_request(
        &self,
        amount: f64,
        currency: &str,
    ) -> InterpayResult<RequestId> {
        let request = build_request(amount, currency)?;
        let targets = self.session.connected_peers();
        self.deliver(request, &targets).await
    }

    /// Send a payment request to an explicit set of peers.
    pub async fn send_payment_request_to(
        &self,
        amount: f64,
        currency: &str,
        peers: &[PeerIdentity],
    ) -> InterpayResult<RequestId> {
        let request = build_request(amount, currency)?;
        self.deliver(request, peers).await
    }

    /// Register a callback for every received payment request. Callbacks run
    /// on the session worker and must not block.
    pub fn on_payment_request_received<F>(&self, callback: F)
    where
        F: Fn(&PaymentRequest, &PeerIdentity) + Send + Sync + 'static,
    {
        self.inbox
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Stream of received payment requests.
    pub fn subscribe(&self) -> broadcast::Receiver<ReceivedPaymentRequest> {
        self.inbox.events.subscribe()
    }

    async fn deliver(
        &self,
        request: PaymentRequest,
        targets: &[PeerIdentity],
    ) -> InterpayResult<RequestId> {
        if self.session.is_shut_down() {
            return Err(InterpayError::ShuttingDown);
        }
        if targets.is_empty() {
            return Err(InterpayError::NoConnectedPeers);
        }

        let id = request.id();
        let summary = request.to_string();
        let bytes = encode_payload(WirePayload::PaymentRequest(request))?;

        match self.session.send(&bytes, targets).await {
            Ok(()) => {}
            Err(InterpayError::PeerUnreachable { peer, reason })
                if self.session.config().retry_failed_send =>
            {
                warn!(request_id = %id, peer = %peer, reason = %reason, "Send failed, retrying once");
                // Resent to every target; receivers drop the copies they already have.
                self.session.send(&bytes, targets).await?;
            }
            Err(e) => return Err(e),
        }

        info!(request_id = %id, peers = targets.len(), request = %summary, "Payment request sent");
        Ok(id)
    }
}

fn build_request(amount: f64, currency: &str) -> InterpayResult<PaymentRequest> {
    let currency = CurrencyCode::parse(currency)?;
    PaymentRequest::new(amount, currency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn envelope_for(request: &PaymentRequest) -> MessageEnvelope {
        WirePayload::PaymentRequest(request.clone())
            .into_envelope()
            .unwrap()
    }

    fn inbox(window: usize) -> (Inbox, broadcast::Receiver<ReceivedPaymentRequest>) {
        let (events, rx) = broadcast::channel(8);
        let inbox = Inbox {
            listeners: RwLock::new(Vec::new()),
            events,
            recent: Mutex::new(RecentRequests::new(window)),
        };
        (inbox, rx)
    }

    #[test]
    fn test_build_request_validates() {
        assert!(matches!(
            build_request(0.0, "MXN"),
            Err(InterpayError::InvalidAmount(_))
        ));
        assert!(matches!(
            build_request(-5.0, "MXN"),
            Err(InterpayError::InvalidAmount(_))
        ));
        assert!(matches!(
            build_request(10.0, "mx"),
            Err(InterpayError::InvalidCurrency(_))
        ));
        let ok = build_request(100.0, "MXN").unwrap();
        assert_eq!(ok.currency().as_str(), "MXN");
    }

    #[test]
    fn test_recent_requests_evicts_oldest() {
        let mut recent = RecentRequests::new(2);
        let peer = PeerId::from("p1");
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(recent.insert(&peer, a));
        assert!(!recent.insert(&peer, a));
        assert!(recent.insert(&peer, b));
        assert!(recent.insert(&peer, c));
        // `a` fell out of the window.
        assert!(recent.insert(&peer, a));
    }

    #[test]
    fn test_same_id_from_other_peer_is_not_a_resend() {
        let mut recent = RecentRequests::new(4);
        let id = Uuid::new_v4();
        assert!(recent.insert(&PeerId::from("p1"), id));
        assert!(recent.insert(&PeerId::from("p2"), id));
    }

    #[test]
    fn test_zero_window_disables_dedup() {
        let mut recent = RecentRequests::new(0);
        let id = Uuid::new_v4();
        assert!(recent.insert(&PeerId::from("p1"), id));
        assert!(recent.insert(&PeerId::from("p1"), id));
    }

    #[test]
    fn test_inbox_delivers_to_listeners_and_subscribers() {
        let (inbox, mut rx) = inbox(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        inbox
            .listeners
            .write()
            .unwrap()
            .push(Arc::new(move |req: &PaymentRequest, from: &PeerIdentity| {
                sink.lock().unwrap().push((req.id(), from.display_name.clone()));
            }));

        let merchant = PeerIdentity::new("m", "Merchant");
        let request = build_request(100.0, "MXN").unwrap();
        inbox.handle(&envelope_for(&request), &merchant).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (request.id(), "Merchant".to_string()));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.request, request);
        assert_eq!(received.from, merchant);
    }

    #[test]
    fn test_inbox_drops_resend() {
        let (inbox, mut rx) = inbox(16);
        let merchant = PeerIdentity::new("m", "Merchant");
        let request = build_request(25.5, "USD").unwrap();
        inbox.handle(&envelope_for(&request), &merchant).unwrap();
        inbox.handle(&envelope_for(&request), &merchant).unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_inbox_rejects_invalid_payload() {
        let (inbox, mut rx) = inbox(16);
        let envelope = MessageEnvelope::new(
            PAYMENT_REQUEST_TYPE,
            serde_json::json!({"id": Uuid::new_v4(), "amount": -1.0, "currency": "MXN"}),
        );
        let err = inbox
            .handle(&envelope, &PeerIdentity::new("m", "Merchant"))
            .unwrap_err();
        assert!(matches!(err, InterpayError::MalformedPayload(_)));
        assert!(rx.try_recv().is_err());
    }
}
