//! HTTP client for the WhatsApp bridge sidecar.
//!
//! All WhatsApp operations go through this client, which talks to the
//! baileys-based Node.js bridge over HTTP. Send failures are classified by
//! HTTP status so the delivery worker can decide between fallback and retry.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::messaging::channel::{
    DestinationCheck, MessagingChannel, SendError, SendErrorKind, SendReceipt,
};

use super::WhatsAppError;

/// JID suffix for individual WhatsApp accounts.
const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

/// Number of health-check retries before giving up.
const HEALTH_CHECK_RETRIES: u32 = 5;

/// Delay between health-check attempts in milliseconds.
const HEALTH_CHECK_DELAY_MS: u64 = 2000;

/// Client for the WhatsApp HTTP bridge.
pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
}

/// Connection status from the sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppStatus {
    /// Whether the sidecar is connected to WhatsApp.
    pub connected: bool,
    /// The phone number linked, if connected.
    pub phone_number: Option<String>,
}

/// Response envelope from the bridge HTTP API.
#[derive(Deserialize)]
struct BridgeResponse<T> {
    #[allow(dead_code)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Registration check payload.
#[derive(Deserialize)]
struct Registration {
    registered: bool,
}

/// Send acknowledgement payload.
#[derive(Deserialize)]
struct SentMessage {
    message_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl WhatsAppClient {
    /// Create a new client pointing at the given base URL.
    pub fn new(base_url: String, connect_timeout: Duration, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Create a client from the `[bridge]` config section.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.url.clone(),
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Get the current connection status from the sidecar.
    ///
    /// # Errors
    ///
    /// Returns [`WhatsAppError::Http`] if the sidecar is unreachable, or
    /// [`WhatsAppError::SidecarNotRunning`] if it answers without a status.
    pub async fn status(&self) -> Result<WhatsAppStatus, WhatsAppError> {
        let url = format!("{}/status", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let body: BridgeResponse<WhatsAppStatus> = resp.json().await?;
        body.data.ok_or(WhatsAppError::SidecarNotRunning)
    }

    /// Whether the sidecar is reachable and connected to WhatsApp.
    pub async fn health_check(&self) -> bool {
        match self.status().await {
            Ok(status) => status.connected,
            Err(e) => {
                debug!(error = %e, "bridge status check failed");
                false
            }
        }
    }

    /// Wait for the sidecar to become connected, retrying with a fixed delay.
    ///
    /// # Errors
    ///
    /// Returns [`WhatsAppError::NotConnected`] if the bridge never reports a
    /// connection.
    pub async fn wait_healthy(&self) -> Result<(), WhatsAppError> {
        for attempt in 0..HEALTH_CHECK_RETRIES {
            if self.health_check().await {
                return Ok(());
            }
            if attempt < HEALTH_CHECK_RETRIES.saturating_sub(1) {
                tokio::time::sleep(Duration::from_millis(HEALTH_CHECK_DELAY_MS)).await;
            }
        }
        Err(WhatsAppError::NotConnected)
    }

    /// Ask the bridge whether `phone` has a WhatsApp account.
    ///
    /// # Errors
    ///
    /// Returns [`WhatsAppError::Http`] on transport failure or
    /// [`WhatsAppError::Bridge`] when the bridge reports an error.
    pub async fn is_registered(&self, phone: &str) -> Result<bool, WhatsAppError> {
        let url = format!("{}/check", self.base_url);
        let body = serde_json::json!({ "jid": to_jid(phone) });
        let resp = self.client.post(&url).json(&body).send().await?;
        let body: BridgeResponse<Registration> = resp.json().await?;
        match body.data {
            Some(reg) => Ok(reg.registered),
            None => Err(WhatsAppError::Bridge(
                body.error
                    .unwrap_or_else(|| "no registration data".to_owned()),
            )),
        }
    }

    /// Send a text message to `phone`.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] classified by [`classify_status`], or
    /// [`SendErrorKind::Transport`] when the request itself fails.
    pub async fn send_text(&self, phone: &str, text: &str) -> Result<SendReceipt, SendError> {
        let url = format!("{}/send", self.base_url);
        let jid = to_jid(phone);
        let body = serde_json::json!({ "jid": jid, "text": text });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::new(SendErrorKind::Transport, format!("bridge request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let reason = resp
                .json::<BridgeResponse<serde_json::Value>>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("bridge returned {status}"));
            warn!(%status, jid, %reason, "WhatsApp send failed");
            return Err(SendError::new(classify_status(status), reason));
        }

        let sent: Option<SentMessage> = resp
            .json::<BridgeResponse<SentMessage>>()
            .await
            .ok()
            .and_then(|b| b.data);
        debug!(jid, "message sent via WhatsApp");
        Ok(SendReceipt {
            delivery_id: sent.as_ref().and_then(|s| s.message_id.clone()),
            timestamp: sent.and_then(|s| s.timestamp).unwrap_or_else(Utc::now),
        })
    }

    /// Returns the base URL of the sidecar.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl MessagingChannel for WhatsAppClient {
    async fn is_ready(&self) -> bool {
        self.health_check().await
    }

    async fn check_destination(&self, destination: &str) -> DestinationCheck {
        match self.is_registered(destination).await {
            Ok(true) => DestinationCheck::valid(),
            Ok(false) => DestinationCheck::invalid("number not registered on WhatsApp"),
            Err(e) => DestinationCheck::invalid(format!("error checking number: {e}")),
        }
    }

    async fn send(&self, destination: &str, message: &str) -> Result<SendReceipt, SendError> {
        self.send_text(destination, message).await
    }
}

/// Convert a phone identifier into a WhatsApp JID.
///
/// Identifiers that already contain `@` pass through unchanged; otherwise
/// every non-digit is stripped and the user suffix appended.
pub fn to_jid(phone: &str) -> String {
    let phone = phone.trim();
    if phone.contains('@') {
        return phone.to_owned();
    }
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}{USER_JID_SUFFIX}")
}

/// Map a non-success bridge status to a send error kind.
pub fn classify_status(status: StatusCode) -> SendErrorKind {
    match status {
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SendErrorKind::NotRegistered
        }
        StatusCode::TOO_MANY_REQUESTS => SendErrorKind::RateLimited,
        StatusCode::CONFLICT | StatusCode::SERVICE_UNAVAILABLE => SendErrorKind::NotReady,
        _ => SendErrorKind::Transport,
    }
}
