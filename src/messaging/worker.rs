//! The background delivery loop.
//!
//! One worker task runs per session. It walks the queue in order, parks
//! before a row while the run is paused, tries each row's destinations in
//! priority order, and paces itself between rows.
//!
//! A cancel is honoured before every send, not only between rows. A send
//! already handed to the channel always completes.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::DeliveryConfig;

use super::channel::{MessagingChannel, SendError, SendErrorKind, SendReceipt};
use super::contacts::ContactRow;
use super::session::{NextRow, RunState, SharedSession};
use super::stats::DeliveryOutcome;

/// Failure reason recorded for rows with no destination left to try.
pub const NO_USABLE_DESTINATION: &str = "no usable destination";

/// How a row's attempt sequence ended.
enum RowResult {
    /// An outcome (sent or failed) to record.
    Done(DeliveryOutcome),
    /// The channel went away; the row stays unprocessed.
    ChannelLost(SendError),
    /// The run was cancelled before the row finished; it stays unprocessed.
    Cancelled,
}

/// Result of sending to one destination, including its retry.
enum Attempt {
    Delivered(SendReceipt),
    Failed(SendError),
    /// Cancelled during the retry backoff; the retry was not sent.
    Interrupted,
}

/// Drives one session's rows through the channel.
pub(crate) struct DeliveryWorker {
    shared: Arc<SharedSession>,
    channel: Arc<dyn MessagingChannel>,
    config: DeliveryConfig,
    session_id: String,
    state_rx: watch::Receiver<RunState>,
}

impl DeliveryWorker {
    pub(crate) fn new(
        shared: Arc<SharedSession>,
        channel: Arc<dyn MessagingChannel>,
        config: DeliveryConfig,
        session_id: String,
    ) -> Self {
        let state_rx = shared.subscribe();
        Self {
            shared,
            channel,
            config,
            session_id,
            state_rx,
        }
    }

    /// Process rows until the session completes, is cancelled, or loses
    /// its channel.
    pub(crate) async fn run(mut self) {
        info!(session_id = %self.session_id, "delivery worker started");

        loop {
            if !self.wait_until_sending().await {
                break;
            }

            let row = match self.shared.next_row(&self.session_id) {
                NextRow::Row(row) => row,
                NextRow::Exhausted => {
                    info!(session_id = %self.session_id, "all rows processed");
                    break;
                }
                NextRow::Stopped => break,
            };

            if !self.channel.is_ready().await {
                warn!(session_id = %self.session_id, row = row.index, "channel not ready, aborting run");
                self.shared
                    .abort_for_channel(&self.session_id, "messaging channel is not ready");
                break;
            }

            let outcome = match self.deliver(&row).await {
                RowResult::Done(outcome) => outcome,
                RowResult::ChannelLost(err) => {
                    warn!(
                        session_id = %self.session_id,
                        row = row.index,
                        error = %err,
                        "channel lost mid-row, aborting run"
                    );
                    self.shared.abort_for_channel(&self.session_id, &err.reason);
                    break;
                }
                RowResult::Cancelled => {
                    info!(
                        session_id = %self.session_id,
                        row = row.index,
                        "cancelled mid-row, row left unprocessed"
                    );
                    break;
                }
            };

            match self.shared.commit(&self.session_id, outcome) {
                Ok(true) => self.pace().await,
                Ok(false) => {}
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "outcome rejected, stopping");
                    break;
                }
            }
        }

        info!(session_id = %self.session_id, "delivery worker stopped");
    }

    /// Block until the run is `Sending`. Returns `false` when the run
    /// reached any other non-paused state.
    async fn wait_until_sending(&mut self) -> bool {
        loop {
            let state = *self.state_rx.borrow_and_update();
            match state {
                RunState::Sending => return true,
                RunState::Paused => {
                    debug!(session_id = %self.session_id, "worker parked while paused");
                }
                RunState::Idle | RunState::Cancelled | RunState::Completed => return false,
            }
            if self.state_rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Try every destination of `row` in priority order.
    async fn deliver(&self, row: &ContactRow) -> RowResult {
        let mut last_error: Option<String> = None;
        let mut last_destination: Option<String> = None;

        for destination in &row.destinations {
            if self.config.validate_destinations {
                let check = self.channel.check_destination(destination).await;
                if !check.valid {
                    debug!(row = row.index, destination, reason = %check.reason, "destination skipped");
                    continue;
                }
            }

            if self.is_cancelled() {
                return RowResult::Cancelled;
            }

            last_destination = Some(destination.clone());
            match self.attempt(destination, &row.message).await {
                Attempt::Delivered(receipt) => {
                    debug!(
                        row = row.index,
                        destination,
                        delivery_id = receipt.delivery_id.as_deref().unwrap_or("-"),
                        "row delivered"
                    );
                    return RowResult::Done(DeliveryOutcome::sent(
                        row.clone(),
                        destination.clone(),
                        receipt.timestamp,
                    ));
                }
                Attempt::Interrupted => return RowResult::Cancelled,
                Attempt::Failed(err) => match err.kind {
                    SendErrorKind::NotReady => return RowResult::ChannelLost(err),
                    SendErrorKind::NotRegistered
                    | SendErrorKind::RateLimited
                    | SendErrorKind::Transport => {
                        debug!(row = row.index, destination, error = %err, "falling back to next destination");
                        last_error = Some(err.reason);
                    }
                },
            }
        }

        let error = last_error.unwrap_or_else(|| NO_USABLE_DESTINATION.to_owned());
        warn!(row = row.index, contact = %row.name, %error, "row failed on every destination");
        RowResult::Done(DeliveryOutcome::failed(row.clone(), last_destination, error))
    }

    /// Send once, retrying a single time after a backoff on transient failures.
    async fn attempt(&self, destination: &str, message: &str) -> Attempt {
        let err = match self.channel.send(destination, message).await {
            Ok(receipt) => return Attempt::Delivered(receipt),
            Err(err) => err,
        };
        if !err.kind.is_transient() {
            return Attempt::Failed(err);
        }
        let backoff = self.config.retry_backoff();
        warn!(
            destination,
            error = %err,
            backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
            "transient send failure, retrying once"
        );
        if !self.sleep_unless_cancelled(backoff).await {
            debug!(destination, "retry skipped, run cancelled during backoff");
            return Attempt::Interrupted;
        }
        match self.channel.send(destination, message).await {
            Ok(receipt) => Attempt::Delivered(receipt),
            Err(err) => Attempt::Failed(err),
        }
    }

    /// Wait between rows. A cancel cuts the wait short; a pause is left for
    /// the next suspension check.
    async fn pace(&self) {
        let delay = self.pacing_delay();
        if delay.is_zero() {
            return;
        }
        if !self.sleep_unless_cancelled(delay).await {
            debug!(session_id = %self.session_id, "pacing interrupted by cancel");
        }
    }

    /// Sleep for `delay`. Returns `false` if the run was cancelled first.
    async fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        let mut state_rx = self.state_rx.clone();
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            _ = state_rx.wait_for(|state| *state == RunState::Cancelled) => false,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.state_rx.borrow() == RunState::Cancelled
    }

    fn pacing_delay(&self) -> Duration {
        let jitter_ms = self.config.pacing_jitter_ms;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.config
            .pacing()
            .saturating_add(Duration::from_millis(jitter))
    }
}
