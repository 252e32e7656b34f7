//! Run state machine and the single shared session it guards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use super::contacts::{ContactQueue, ContactRow};
use super::events::{ChannelStatus, EventPublisher, ProgressEvent};
use super::stats::{DeliveryOutcome, OutcomeLog, StatsSnapshot};
use super::MessagingError;

/// Lifecycle state of a sending session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No session, or a finished session was reset.
    Idle,
    /// The worker is delivering rows.
    Sending,
    /// The worker is parked at its next suspension point.
    Paused,
    /// Terminal: an operator or a channel failure stopped the run.
    Cancelled,
    /// Terminal: every row was processed.
    Completed,
}

/// Operator commands that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommand {
    /// Park the worker at its next suspension point.
    Pause,
    /// Let a paused worker continue.
    Resume,
    /// Stop the run permanently.
    Cancel,
    /// Return a finished session to `Idle`.
    Reset,
}

impl RunState {
    /// Returns the lowercase wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// Whether a session is in flight (`Sending` or `Paused`).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Sending | Self::Paused)
    }

    /// Whether the session has finished (`Cancelled` or `Completed`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Resolve an operator command against the current state.
    ///
    /// Returns `Ok(Some(next))` for a real transition and `Ok(None)` for an
    /// idempotent no-op (pausing a paused run, resuming a running one,
    /// resetting an idle session).
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidRequest`] when the command is not
    /// allowed from this state.
    pub fn apply(self, command: RunCommand) -> Result<Option<RunState>, MessagingError> {
        match (self, command) {
            (Self::Sending, RunCommand::Pause) => Ok(Some(Self::Paused)),
            (Self::Paused, RunCommand::Pause) => Ok(None),
            (Self::Paused, RunCommand::Resume) => Ok(Some(Self::Sending)),
            (Self::Sending, RunCommand::Resume) => Ok(None),
            (Self::Sending | Self::Paused, RunCommand::Cancel) => Ok(Some(Self::Cancelled)),
            (Self::Cancelled | Self::Completed, RunCommand::Reset) => Ok(Some(Self::Idle)),
            (Self::Idle, RunCommand::Reset) => Ok(None),
            (state, command) => Err(MessagingError::InvalidRequest(format!(
                "cannot {command:?} while {}",
                state.as_str()
            ))),
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that belongs to one run: queue, cursor, state and counters.
#[derive(Debug, Clone)]
pub struct SendingSession {
    id: String,
    queue: ContactQueue,
    state: RunState,
    stats: StatsSnapshot,
    log: OutcomeLog,
}

impl SendingSession {
    /// An empty idle session.
    pub fn idle(log_capacity: usize) -> Self {
        Self::new(Vec::new(), log_capacity)
    }

    /// A fresh session over `rows`, still `Idle` until started.
    pub fn new(rows: Vec<ContactRow>, log_capacity: usize) -> Self {
        let queue = ContactQueue::new(rows);
        let stats = StatsSnapshot::new(queue.len());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue,
            state: RunState::Idle,
            stats,
            log: OutcomeLog::with_capacity(log_capacity),
        }
    }

    /// Unique session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Index of the next row to attempt.
    pub fn cursor(&self) -> usize {
        self.queue.cursor()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats
    }

    /// The session's queue.
    pub fn queue(&self) -> &ContactQueue {
        &self.queue
    }

    /// The most recent outcomes, oldest first.
    pub fn recent_outcomes(&self) -> Vec<DeliveryOutcome> {
        self.log.entries().cloned().collect()
    }

    /// Commit the outcome of the row at the cursor and advance past it.
    fn record(&mut self, outcome: DeliveryOutcome) {
        self.stats.record(outcome.status);
        self.queue.advance();
        self.log.push(outcome);
    }
}

/// The session plus the signals used to observe it, shared between the
/// orchestrator (control path) and the worker task.
///
/// Every mutation happens while holding `session`, and every state change is
/// mirrored to `state_tx` and the publisher before the lock is released.
pub(crate) struct SharedSession {
    session: Mutex<SendingSession>,
    state_tx: watch::Sender<RunState>,
    publisher: Arc<dyn EventPublisher>,
}

/// What the worker should do next.
pub(crate) enum NextRow {
    /// Attempt this row.
    Row(ContactRow),
    /// Every row is done; the session was marked `Completed`.
    Exhausted,
    /// The session is no longer sending (or was replaced).
    Stopped,
}

impl SharedSession {
    pub(crate) fn new(publisher: Arc<dyn EventPublisher>, log_capacity: usize) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            session: Mutex::new(SendingSession::idle(log_capacity)),
            state_tx,
            publisher,
        }
    }

    /// Lock the session. A poisoned lock still holds consistent data because
    /// every critical section is a single field-level update.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SendingSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    /// Change state while the caller holds the lock, then notify.
    pub(crate) fn transition_locked(
        &self,
        session: &mut SendingSession,
        next: RunState,
        channel: Option<ChannelStatus>,
    ) {
        let previous = session.state;
        session.state = next;
        self.state_tx.send_replace(next);
        info!(
            session_id = %session.id,
            from = %previous,
            to = %next,
            cursor = session.cursor(),
            "run state changed"
        );
        let event = match channel {
            Some(status) => ProgressEvent::StatusUpdate {
                whatsapp: Some(status),
                messaging: Some(next),
            },
            None => ProgressEvent::run_state(next),
        };
        self.publisher.publish(event);
    }

    /// Replace the session and start it in `Sending`.
    pub(crate) fn begin_locked(&self, session: &mut SendingSession, fresh: SendingSession) {
        *session = fresh;
        self.transition_locked(session, RunState::Sending, None);
        self.publisher
            .publish(ProgressEvent::StatsUpdate(session.stats()));
    }

    /// Fetch the row at the cursor for session `id`, completing the session
    /// when the queue is exhausted.
    pub(crate) fn next_row(&self, id: &str) -> NextRow {
        let mut session = self.lock();
        if session.id != id || session.state != RunState::Sending {
            return NextRow::Stopped;
        }
        match session.queue.current().cloned() {
            Some(row) => NextRow::Row(row),
            None => {
                self.transition_locked(&mut session, RunState::Completed, None);
                NextRow::Exhausted
            }
        }
    }

    /// Record an outcome for session `id` and publish it.
    ///
    /// Returns whether rows remain after this one. Outcomes are recorded even
    /// when the session was cancelled mid-send, since the send already happened.
    pub(crate) fn commit(&self, id: &str, outcome: DeliveryOutcome) -> Result<bool, MessagingError> {
        let mut session = self.lock();
        if session.id != id {
            return Err(MessagingError::InvalidRequest(format!(
                "outcome for stale session {id}"
            )));
        }
        if session.queue.current().map(|row| row.index) != Some(outcome.row.index) {
            return Err(MessagingError::InvalidRequest(format!(
                "outcome for row {} does not match cursor {}",
                outcome.row.index,
                session.cursor()
            )));
        }

        debug!(
            session_id = %session.id,
            row = outcome.row.index,
            status = outcome.status.as_str(),
            destination = outcome.destination_used.as_deref().unwrap_or("-"),
            "outcome recorded"
        );
        let message_event = ProgressEvent::from_outcome(&outcome);
        let log_event = ProgressEvent::log_entry(&outcome);
        session.record(outcome);

        self.publisher.publish(message_event);
        self.publisher.publish(log_event);
        self.publisher
            .publish(ProgressEvent::StatsUpdate(session.stats()));
        Ok(!session.queue.is_exhausted())
    }

    /// Abort session `id` because the channel cannot send.
    pub(crate) fn abort_for_channel(&self, id: &str, reason: &str) {
        let mut session = self.lock();
        if session.id != id || !session.state.is_active() {
            return;
        }
        self.transition_locked(
            &mut session,
            RunState::Cancelled,
            Some(ChannelStatus::Disconnected),
        );
        self.publisher.publish(ProgressEvent::ChannelError {
            error: reason.to_owned(),
        });
    }
}
