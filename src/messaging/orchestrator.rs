//! The bulk messaging orchestrator: single authority over run state.
//!
//! Control requests (`start`, `pause`, `resume`, `cancel`, `reset`) may arrive
//! from any task. Each one is a single critical section on the shared
//! session, so the worker never observes a half-applied transition.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::DeliveryConfig;

use super::channel::MessagingChannel;
use super::contacts::ContactRow;
use super::control::ControlRequest;
use super::events::EventPublisher;
use super::session::{RunCommand, RunState, SendingSession, SharedSession};
use super::stats::{DeliveryOutcome, StatsSnapshot};
use super::worker::DeliveryWorker;
use super::MessagingError;

/// Owns the sending session and drives its delivery worker.
pub struct Orchestrator {
    shared: Arc<SharedSession>,
    channel: Arc<dyn MessagingChannel>,
    config: DeliveryConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Create an idle orchestrator over the injected collaborators.
    pub fn new(
        channel: Arc<dyn MessagingChannel>,
        publisher: Arc<dyn EventPublisher>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            shared: Arc::new(SharedSession::new(publisher, config.log_capacity)),
            channel,
            config,
            worker: Mutex::new(None),
        }
    }

    /// Start a new session over `rows` and spawn its worker.
    ///
    /// Must be called from within a Tokio runtime. Returns the new session id.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidRequest`] if `rows` is empty, a session
    /// is `Sending` or `Paused`, or the previous worker is still finishing an
    /// in-flight send. The current session is left untouched.
    pub fn start(&self, rows: Vec<ContactRow>) -> Result<String, MessagingError> {
        if rows.is_empty() {
            return Err(MessagingError::InvalidRequest(
                "cannot start a session with no rows".to_owned(),
            ));
        }

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let mut session = self.shared.lock();

        if session.state().is_active() {
            return Err(MessagingError::InvalidRequest(format!(
                "a session is already {}",
                session.state()
            )));
        }
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(MessagingError::InvalidRequest(
                "previous session is still finishing an in-flight send".to_owned(),
            ));
        }

        let total = rows.len();
        self.shared
            .begin_locked(&mut session, SendingSession::new(rows, self.config.log_capacity));
        let session_id = session.id().to_owned();
        drop(session);

        let delivery = DeliveryWorker::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.channel),
            self.config.clone(),
            session_id.clone(),
        );
        *worker = Some(tokio::spawn(delivery.run()));

        info!(%session_id, total, "sending session started");
        Ok(session_id)
    }

    /// Pause the running session. Idempotent while paused.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidRequest`] unless the session is
    /// `Sending` or `Paused`.
    pub fn pause(&self) -> Result<RunState, MessagingError> {
        self.command(RunCommand::Pause)
    }

    /// Resume a paused session. Idempotent while sending.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidRequest`] unless the session is
    /// `Sending` or `Paused`.
    pub fn resume(&self) -> Result<RunState, MessagingError> {
        self.command(RunCommand::Resume)
    }

    /// Cancel the session. The worker stops at its next suspension point.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidRequest`] unless the session is
    /// `Sending` or `Paused`.
    pub fn cancel(&self) -> Result<RunState, MessagingError> {
        self.command(RunCommand::Cancel)
    }

    /// Return a completed or cancelled session to `Idle`, clearing it.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidRequest`] while a session is active
    /// or its worker is still draining.
    pub fn reset(&self) -> Result<RunState, MessagingError> {
        if self.worker_running() {
            return Err(MessagingError::InvalidRequest(
                "cannot reset while the worker is still running".to_owned(),
            ));
        }
        let mut session = self.shared.lock();
        if session.state().apply(RunCommand::Reset)?.is_some() {
            *session = SendingSession::idle(self.config.log_capacity);
            self.shared
                .transition_locked(&mut session, RunState::Idle, None);
        }
        Ok(session.state())
    }

    /// Dispatch an operator control request.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying operation.
    pub fn handle(&self, request: ControlRequest) -> Result<RunState, MessagingError> {
        match request {
            ControlRequest::StartMessaging { rows } => {
                self.start(rows)?;
                Ok(self.state())
            }
            ControlRequest::PauseMessaging => self.pause(),
            ControlRequest::ResumeMessaging => self.resume(),
            ControlRequest::CancelMessaging => self.cancel(),
            ControlRequest::ResetMessaging => self.reset(),
        }
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.shared.lock().state()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.lock().stats()
    }

    /// Index of the next row to attempt.
    pub fn cursor(&self) -> usize {
        self.shared.lock().cursor()
    }

    /// Identifier of the current session.
    pub fn session_id(&self) -> String {
        self.shared.lock().id().to_owned()
    }

    /// The capped display log, oldest first.
    pub fn recent_outcomes(&self) -> Vec<DeliveryOutcome> {
        self.shared.lock().recent_outcomes()
    }

    /// Watch run state changes.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.shared.subscribe()
    }

    /// Wait until the session leaves `Sending`/`Paused` and its worker exits.
    ///
    /// Returns immediately when no session is active.
    pub async fn wait_finished(&self) -> RunState {
        let mut state_rx = self.shared.subscribe();
        if state_rx.wait_for(|state| !state.is_active()).await.is_err() {
            debug!("state channel closed while waiting for session end");
        }
        self.join_worker().await;
        self.state()
    }

    fn command(&self, command: RunCommand) -> Result<RunState, MessagingError> {
        let mut session = self.shared.lock();
        match session.state().apply(command)? {
            Some(next) => self.shared.transition_locked(&mut session, next, None),
            None => debug!(?command, state = %session.state(), "command is a no-op"),
        }
        Ok(session.state())
    }

    fn worker_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn join_worker(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "delivery worker task failed");
            }
        }
    }
}
