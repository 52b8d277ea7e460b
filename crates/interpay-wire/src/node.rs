//! One device's complete session stack.
//!
//! Owns the router, session manager and payment service, built in the order
//! that guarantees the payment-request handler exists before the transport
//! starts advertising. Drop it only after [`InterpayNode::shutdown`].

use crate::payment::{PaymentRequestService, ReceivedPaymentRequest};
use crate::policy::policy_from_config;
use crate::router::MessageRouter;
use crate::session::{SessionManager, SessionStats};
use crate::transport::Transport;
use interpay_types::config::SessionConfig;
use interpay_types::error::InterpayResult;
use interpay_types::payment::{PaymentRequest, RequestId};
use interpay_types::peer::{PeerIdentity, PeerRecord};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

pub struct InterpayNode {
    session: Arc<SessionManager>,
    payments: PaymentRequestService,
}

impl InterpayNode {
    /// Build the stack on top of `transport` and start the session.
    pub async fn start(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
    ) -> InterpayResult<Self> {
        let display_name = config.display_name.clone();
        let router = Arc::new(MessageRouter::new());
        let policy = policy_from_config(&config.trust);
        let session = SessionManager::new(config, transport, policy, router);
        let payments = PaymentRequestService::new(Arc::clone(&session));

        if let Err(e) = session.start().await {
            session.shutdown().await;
            return Err(e);
        }
        info!(name = %display_name, "Interpay node started");
        Ok(Self { session, payments })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn payments(&self) -> &PaymentRequestService {
        &self.payments
    }

    /// Push-style peer list.
    pub fn observe_peers(&self) -> watch::Receiver<Vec<PeerRecord>> {
        self.session.observe_peers()
    }

    pub fn peers(&self) -> Vec<PeerRecord> {
        self.session.peers()
    }

    pub fn connected_peers(&self) -> Vec<PeerIdentity> {
        self.session.connected_peers()
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    /// Send a payment request to every connected peer.
    pub async fn send_payment_request(
        &self,
        amount: f64,
        currency: &str,
    ) -> InterpayResult<RequestId> {
        self.payments.send_payment_request(amount, currency).await
    }

    pub fn subscribe_payment_requests(&self) -> broadcast::Receiver<ReceivedPaymentRequest> {
        self.payments.subscribe()
    }

    pub fn on_payment_request_received<F>(&self, callback: F)
    where
        F: Fn(&PaymentRequest, &PeerIdentity) + Send + Sync + 'static,
    {
        self.payments.on_payment_request_received(callback);
    }

    /// Wait until every transport event received so far has been applied.
    pub async fn flush(&self) -> InterpayResult<()> {
        self.session.flush().await
    }

    /// Tear the session down. Idempotent.
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }
}
