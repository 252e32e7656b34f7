//! Connection event listener for the WhatsApp bridge.
//!
//! Long-polls the sidecar's `/events/poll` endpoint and forwards connection
//! changes over an mpsc channel, so the operator sees the channel drop or
//! come back while a run is in progress.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::messaging::events::ChannelStatus;

/// A connection event from the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WhatsAppEvent {
    /// WhatsApp connection established.
    Connected,
    /// WhatsApp connection lost.
    Disconnected {
        /// Human-readable reason, if available.
        #[serde(default)]
        reason: Option<String>,
    },
    /// The sidecar needs a QR scan to pair.
    Qr,
}

impl WhatsAppEvent {
    /// Operator-facing channel status for this event.
    pub fn channel_status(&self) -> ChannelStatus {
        match self {
            Self::Connected => ChannelStatus::Ready,
            Self::Disconnected { .. } => ChannelStatus::Disconnected,
            Self::Qr => ChannelStatus::Qr,
        }
    }
}

/// Long-poll timeout for the HTTP client (seconds).
const POLL_TIMEOUT_SECS: u64 = 60;

/// Initial reconnect backoff (milliseconds).
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum reconnect backoff (milliseconds).
const MAX_BACKOFF_MS: u64 = 30_000;

/// Spawn an event listener that forwards events to the given channel.
///
/// Returns immediately. The listener runs as a background Tokio task and
/// reconnects automatically with exponential backoff. It exits when the
/// receiver is dropped.
pub fn spawn_event_listener(
    base_url: String,
    event_tx: mpsc::Sender<WhatsAppEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_url = format!("{}/events/poll", base_url.trim_end_matches('/'));
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            info!(url = %poll_url, "connecting to WhatsApp event stream");

            match poll_events(&poll_url, &event_tx).await {
                Ok(()) => {
                    info!("WhatsApp event stream closed normally");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, backoff_ms, "WhatsApp event stream error, reconnecting");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = next_backoff(backoff_ms);
                }
            }
        }
    })
}

/// Double the backoff, capped at [`MAX_BACKOFF_MS`].
fn next_backoff(current_ms: u64) -> u64 {
    current_ms.saturating_mul(2).min(MAX_BACKOFF_MS)
}

/// Poll the sidecar for events in a loop. Returns `Err` on non-timeout
/// network errors so the caller can reconnect with backoff.
async fn poll_events(
    poll_url: &str,
    event_tx: &mpsc::Sender<WhatsAppEvent>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(POLL_TIMEOUT_SECS))
        .build()?;

    loop {
        match client.get(poll_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<Vec<WhatsAppEvent>>().await {
                    Ok(events) => {
                        for event in events {
                            debug!(?event, "received WhatsApp event");
                            if event_tx.send(event).await.is_err() {
                                // Receiver dropped, shut down cleanly.
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => debug!(error = %e, "ignoring undecodable event batch"),
                }
            }
            Ok(resp) => {
                debug!(status = %resp.status(), "event poll returned non-200");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Err(e) if e.is_timeout() => {
                // Long-poll timeout expired, retry immediately.
                continue;
            }
            Err(e) => {
                return Err(e.into());
            }
        }
    }
}
