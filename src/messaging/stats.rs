//! Per-row delivery outcomes and the running counters derived from them.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::contacts::ContactRow;

/// Default number of outcomes retained for display.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Final status of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The message was accepted by the channel for one destination.
    Sent,
    /// Every destination was exhausted without success.
    Failed,
}

impl DeliveryStatus {
    /// Lowercase label used in log events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// The recorded result of attempting one row.
///
/// Produced exactly once per processed row and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// The row this outcome belongs to.
    pub row: ContactRow,
    /// The destination that accepted the message, or the last one tried.
    pub destination_used: Option<String>,
    /// Sent or failed.
    pub status: DeliveryStatus,
    /// Reason of the last failure when `status` is `Failed`.
    pub error: Option<String>,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
}

impl DeliveryOutcome {
    /// Outcome for a row delivered to `destination`.
    pub fn sent(row: ContactRow, destination: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            row,
            destination_used: Some(destination),
            status: DeliveryStatus::Sent,
            error: None,
            timestamp,
        }
    }

    /// Outcome for a row whose destinations were all exhausted.
    pub fn failed(row: ContactRow, last_destination: Option<String>, error: String) -> Self {
        Self {
            row,
            destination_used: last_destination,
            status: DeliveryStatus::Failed,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate counters for a session.
///
/// `sent + failed + remaining == total` holds at every observable point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Number of rows in the queue.
    pub total: usize,
    /// Rows delivered.
    pub sent: usize,
    /// Rows that exhausted every destination.
    pub failed: usize,
    /// Rows not yet processed.
    pub remaining: usize,
}

impl StatsSnapshot {
    /// Fresh counters for a queue of `total` rows.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            sent: 0,
            failed: 0,
            remaining: total,
        }
    }

    /// Rows processed so far.
    pub fn processed(&self) -> usize {
        self.sent.saturating_add(self.failed)
    }

    /// Fold one outcome into the counters.
    pub fn record(&mut self, status: DeliveryStatus) {
        if self.remaining == 0 {
            return;
        }
        match status {
            DeliveryStatus::Sent => self.sent = self.sent.saturating_add(1),
            DeliveryStatus::Failed => self.failed = self.failed.saturating_add(1),
        }
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Recompute counters from a complete outcome sequence.
    pub fn from_outcomes<'a>(
        total: usize,
        outcomes: impl IntoIterator<Item = &'a DeliveryOutcome>,
    ) -> Self {
        let mut stats = Self::new(total);
        for outcome in outcomes {
            stats.record(outcome.status);
        }
        stats
    }
}

/// Bounded log of the most recent outcomes, oldest first.
///
/// Display only: authoritative counts live in [`StatsSnapshot`].
#[derive(Debug, Clone)]
pub struct OutcomeLog {
    entries: VecDeque<DeliveryOutcome>,
    capacity: usize,
}

impl OutcomeLog {
    /// Create a log holding at most `capacity` entries (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an outcome, evicting the oldest entry when full.
    pub fn push(&mut self, outcome: DeliveryOutcome) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(outcome);
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.entries.iter()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for OutcomeLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}
