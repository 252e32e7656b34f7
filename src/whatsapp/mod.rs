//! WhatsApp adapter: HTTP bridge client and connection event listener.
//!
//! Communicates with a baileys-based sidecar via HTTP on port 3001 and
//! long-polling for connection events. Pairing and credential storage are
//! the sidecar's job; this adapter only reads readiness and sends.

pub mod client;
pub mod events;

/// Errors from the WhatsApp adapter.
#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    /// HTTP request to the sidecar failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The sidecar is not running or not reachable.
    #[error("sidecar not running")]
    SidecarNotRunning,

    /// The sidecar is running but WhatsApp is not connected (needs QR scan).
    #[error("not connected to WhatsApp")]
    NotConnected,

    /// The sidecar answered with an error payload.
    #[error("bridge error: {0}")]
    Bridge(String),
}
