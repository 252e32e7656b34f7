//! The messaging channel capability consumed by the delivery worker.
//!
//! The core never owns the channel's lifecycle (pairing, credentials,
//! reconnects). It only asks whether the channel is ready, optionally
//! whether a destination is usable, and sends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed classification of send failures.
///
/// The worker decides fallback and retry purely from this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendErrorKind {
    /// Destination is not registered on the channel or is malformed.
    NotRegistered,
    /// The channel throttled the request.
    RateLimited,
    /// Network or timeout failure talking to the channel.
    Transport,
    /// The channel itself is not connected.
    NotReady,
}

impl SendErrorKind {
    /// Whether the failure is worth one retry on the same destination.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transport)
    }
}

/// A failed send attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {reason}")]
pub struct SendError {
    /// Classification used for fallback and retry decisions.
    pub kind: SendErrorKind,
    /// Human-readable reason, recorded on the row if it ends up failed.
    pub reason: String,
}

impl SendError {
    /// Build a send error of the given kind.
    pub fn new(kind: SendErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Acknowledgement of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Channel-assigned message identifier, if the channel reports one.
    pub delivery_id: Option<String>,
    /// When the channel accepted the message.
    pub timestamp: DateTime<Utc>,
}

/// Result of a destination validity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationCheck {
    /// Whether the destination can receive messages.
    pub valid: bool,
    /// Explanation, used as the failure reason when invalid.
    pub reason: String,
}

impl DestinationCheck {
    /// A usable destination.
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: "valid destination".to_owned(),
        }
    }

    /// An unusable destination with the given reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// External messaging channel.
///
/// Implementations enforce their own per-attempt timeouts and surface them
/// as [`SendErrorKind::Transport`].
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    /// Whether the channel is connected and able to send.
    async fn is_ready(&self) -> bool;

    /// Check whether `destination` can receive messages.
    async fn check_destination(&self, destination: &str) -> DestinationCheck;

    /// Send `message` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] whose kind drives the worker's fallback policy.
    async fn send(&self, destination: &str, message: &str) -> Result<SendReceipt, SendError>;
}
