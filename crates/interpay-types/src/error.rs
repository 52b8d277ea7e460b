//! Shared error types for the Interpay session core.

use thiserror::Error;

/// Top-level error type for the Interpay session core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpayError {
    /// The transport failed to connect or deliver to a peer.
    #[error("Peer unreachable: {peer} ({reason})")]
    PeerUnreachable {
        /// Display name or id of the peer(s) involved.
        peer: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// The transport failed to start or stop advertising or browsing.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A send was attempted with an empty target set.
    #[error("No connected peers")]
    NoConnectedPeers,

    /// Received bytes are not a valid envelope or payload.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// An outgoing envelope could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A peer state machine was asked to take an illegal transition.
    #[error("Invalid state transition for peer {peer}: {from} -> {to}")]
    InvalidStateTransition {
        /// The peer whose record was being updated.
        peer: String,
        /// State currently recorded.
        from: String,
        /// State reported by the transport.
        to: String,
    },

    /// Payment amount is zero, negative or not finite.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Currency code is not three uppercase ASCII letters.
    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    /// The session has been torn down.
    #[error("Shutdown in progress")]
    ShuttingDown,

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl InterpayError {
    /// Whether this error indicates a defect in the session core rather than
    /// a runtime condition.
    pub fn is_defect(&self) -> bool {
        matches!(self, InterpayError::InvalidStateTransition { .. })
    }
}

/// Alias for Result with InterpayError.
pub type InterpayResult<T> = Result<T, InterpayError>;
