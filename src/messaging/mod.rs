//! Messaging core: contact queue, delivery worker, and the orchestrator that
//! owns the sending session.
//!
//! # Locking
//!
//! The session (queue, cursor, state, counters) sits behind one mutex shared
//! by the orchestrator and the worker task. Each control request and each
//! recorded outcome is one critical section, and events are published inside
//! it, so subscribers see state changes and outcomes in production order.
//! The lock is never held across an `.await`.

pub mod channel;
pub mod contacts;
pub mod control;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod stats;
pub(crate) mod worker;

pub use worker::NO_USABLE_DESTINATION;

/// Errors from the messaging subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    /// A control request was malformed or not allowed in the current state.
    /// The session is left unchanged.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
