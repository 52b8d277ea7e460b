//! Interpay peer sessions — local-network payment requests between devices.
//!
//! A merchant device discovers nearby customer devices, connects to them and
//! sends payment requests; customers receive and surface them.
//!
//! ## Architecture
//!
//! - **Transport**: capability trait for the local-network medium
//! - **PeerRegistry**: known peers and their connection state
//! - **SessionManager**: single worker that applies transport events in order
//! - **MessageRouter**: dispatches decoded envelopes by type tag
//! - **PaymentRequestService**: builds, sends and receives payment requests
//! - **InterpayNode**: wires the above together for one device
//! - **LoopbackNetwork**: in-process transport for tests and demos

pub mod loopback;
pub mod message;
pub mod node;
pub mod payment;
pub mod policy;
pub mod registry;
pub mod router;
pub mod session;
pub mod transport;

pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use message::{MessageEnvelope, WirePayload, PAYMENT_REQUEST_TYPE};
pub use node::InterpayNode;
pub use payment::{PaymentRequestService, ReceivedPaymentRequest};
pub use policy::{AcceptAll, AcceptPolicy, AllowList};
pub use registry::PeerRegistry;
pub use router::{DispatchOutcome, MessageHandler, MessageRouter};
pub use session::{SessionManager, SessionStats};
pub use transport::{SendMode, Transport, TransportError, TransportEvent, TransportEventSink};
