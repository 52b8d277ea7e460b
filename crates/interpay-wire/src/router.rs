//! Message router — dispatches decoded envelopes to handlers by type tag.
//!
//! One handler per tag; registering again for the same tag replaces the
//! previous handler. Envelopes with a tag nobody registered are dropped with
//! a warning so that newer peers can introduce message types without
//! breaking older ones.

use crate::message::{decode_envelope, MessageEnvelope};
use dashmap::DashMap;
use interpay_types::error::InterpayResult;
use interpay_types::peer::PeerIdentity;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handles every envelope of one type tag.
///
/// Handlers run on the session worker, so they must not block; hand long
/// work off to a channel or a spawned task.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, envelope: &MessageEnvelope, from: &PeerIdentity) -> InterpayResult<()>;
}

impl<F> MessageHandler for F
where
    F: Fn(&MessageEnvelope, &PeerIdentity) -> InterpayResult<()> + Send + Sync,
{
    fn handle(&self, envelope: &MessageEnvelope, from: &PeerIdentity) -> InterpayResult<()> {
        self(envelope, from)
    }
}

/// What happened to a dispatched envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran and accepted the message.
    Handled,
    /// No handler is registered for the tag; the message was dropped.
    Unhandled,
    /// Decoding or the handler failed; the message was dropped.
    Failed,
}

/// Routes envelopes to the handler registered for their type tag.
#[derive(Default)]
pub struct MessageRouter {
    handlers: DashMap<String, Arc<dyn MessageHandler>>,
}

impl MessageRouter {
    /// Create a router with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register `handler` for `message_type`, returning the handler it
    /// replaced, if any.
    pub fn register(
        &self,
        message_type: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Option<Arc<dyn MessageHandler>> {
        let message_type = message_type.into();
        let previous = self.handlers.insert(message_type.clone(), handler);
        if previous.is_some() {
            debug!(message_type = %message_type, "Replaced message handler");
        }
        previous
    }

    /// Remove the handler for `message_type`.
    pub fn unregister(&self, message_type: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.remove(message_type).map(|(_, h)| h)
    }

    pub fn has_handler(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// Dispatch an already decoded envelope.
    pub fn dispatch(&self, envelope: &MessageEnvelope, from: &PeerIdentity) -> DispatchOutcome {
        // Clone the Arc out so the map shard is not locked while the handler runs.
        let handler = match self.handlers.get(&envelope.message_type) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                warn!(
                    message_type = %envelope.message_type,
                    peer = %from,
                    "Dropping message with unknown type"
                );
                return DispatchOutcome::Unhandled;
            }
        };

        match handler.handle(envelope, from) {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => {
                warn!(
                    message_type = %envelope.message_type,
                    peer = %from,
                    error = %e,
                    "Message handler rejected message"
                );
                DispatchOutcome::Failed
            }
        }
    }

    /// Decode raw bytes from a peer and dispatch them.
    pub fn dispatch_bytes(&self, bytes: &[u8], from: &PeerIdentity) -> DispatchOutcome {
        match decode_envelope(bytes) {
            Ok(envelope) => self.dispatch(&envelope, from),
            Err(e) => {
                warn!(peer = %from, len = bytes.len(), error = %e, "Dropping undecodable message");
                DispatchOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("MessageRouter")
            .field("handlers", &tags)
            .finish()
    }
}
