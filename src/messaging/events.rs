//! Progress notifications and the publisher capability that receives them.
//!
//! The orchestrator depends only on [`EventPublisher`]; how events reach an
//! operator (stdout, a socket, a UI) is decided outside the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use super::session::RunState;
use super::stats::{DeliveryOutcome, DeliveryStatus, StatsSnapshot};

/// Channel connection status as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Not connected.
    Disconnected,
    /// Waiting for a QR code to be scanned.
    Qr,
    /// Connected and able to send.
    Ready,
}

/// Contact fields mirrored into a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContact {
    /// Display name.
    pub name: String,
    /// Civil identifier.
    pub civil_id: String,
}

/// Display-oriented mirror of a [`DeliveryOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique entry identifier.
    pub id: String,
    /// Contact the message was addressed to.
    pub contact: LogContact,
    /// Destination used (empty when none was usable).
    pub phone: String,
    /// Message text.
    pub message: String,
    /// `sent` or `failed`.
    pub status: DeliveryStatus,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
    /// Failure reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A structured progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Channel or run state changed.
    StatusUpdate {
        /// New channel status, if it changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        whatsapp: Option<ChannelStatus>,
        /// New run state, if it changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        messaging: Option<RunState>,
    },
    /// A row was delivered.
    MessageSent {
        /// Row index.
        row: usize,
        /// Contact name.
        contact: String,
        /// Destination that accepted the message.
        phone: String,
        /// When the outcome was recorded.
        timestamp: DateTime<Utc>,
    },
    /// A row exhausted every destination.
    MessageFailed {
        /// Row index.
        row: usize,
        /// Contact name.
        contact: String,
        /// Last destination tried, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phone: Option<String>,
        /// Last failure reason.
        error: String,
        /// When the outcome was recorded.
        timestamp: DateTime<Utc>,
    },
    /// Display log entry for an outcome.
    LogUpdate(LogEntry),
    /// Counters after the latest outcome.
    StatsUpdate(StatsSnapshot),
    /// The channel failed in a way that aborted the run.
    ChannelError {
        /// Failure description.
        error: String,
    },
}

impl ProgressEvent {
    /// Run state notification.
    pub fn run_state(state: RunState) -> Self {
        Self::StatusUpdate {
            whatsapp: None,
            messaging: Some(state),
        }
    }

    /// Channel status notification.
    pub fn channel_status(status: ChannelStatus) -> Self {
        Self::StatusUpdate {
            whatsapp: Some(status),
            messaging: None,
        }
    }

    /// `message_sent` or `message_failed` for an outcome.
    pub fn from_outcome(outcome: &DeliveryOutcome) -> Self {
        match outcome.status {
            DeliveryStatus::Sent => Self::MessageSent {
                row: outcome.row.index,
                contact: outcome.row.name.clone(),
                phone: outcome.destination_used.clone().unwrap_or_default(),
                timestamp: outcome.timestamp,
            },
            DeliveryStatus::Failed => Self::MessageFailed {
                row: outcome.row.index,
                contact: outcome.row.name.clone(),
                phone: outcome.destination_used.clone(),
                error: outcome.error.clone().unwrap_or_default(),
                timestamp: outcome.timestamp,
            },
        }
    }

    /// `log_update` mirror of an outcome.
    pub fn log_entry(outcome: &DeliveryOutcome) -> Self {
        Self::LogUpdate(LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            contact: LogContact {
                name: outcome.row.name.clone(),
                civil_id: outcome.row.civil_id.clone(),
            },
            phone: outcome.destination_used.clone().unwrap_or_default(),
            message: outcome.row.message.clone(),
            status: outcome.status,
            timestamp: outcome.timestamp,
            error: outcome.error.clone(),
        })
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusUpdate { .. } => "status_update",
            Self::MessageSent { .. } => "message_sent",
            Self::MessageFailed { .. } => "message_failed",
            Self::LogUpdate(_) => "log_update",
            Self::StatsUpdate(_) => "stats_update",
            Self::ChannelError { .. } => "channel_error",
        }
    }
}

/// Receiver of progress notifications.
///
/// Called while the orchestrator holds its session lock, so implementations
/// must not block or call back into the orchestrator.
pub trait EventPublisher: Send + Sync {
    /// Deliver one event.
    fn publish(&self, event: ProgressEvent);
}

/// Fans events out to any number of `tokio::sync::broadcast` subscribers.
///
/// Slow subscribers lag and miss events rather than stalling delivery.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastPublisher {
    /// Create a publisher buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: ProgressEvent) {
        let name = event.name();
        // No subscribers is fine: events are advisory.
        if self.tx.send(event).is_err() {
            trace!(event = name, "no progress subscribers");
        }
    }
}
