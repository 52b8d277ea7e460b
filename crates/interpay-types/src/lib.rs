//! Core types for the Interpay peer payment session.
//!
//! This crate defines the data structures shared by the session core and its
//! collaborators: peer identities and connection states, payment requests,
//! configuration and the error taxonomy. It contains no business logic.

pub mod config;
pub mod error;
pub mod payment;
pub mod peer;
