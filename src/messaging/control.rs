//! Operator control requests as they arrive from a transport.

use serde::{Deserialize, Serialize};

use super::contacts::ContactRow;
use super::MessagingError;

/// A fire-and-forget control request.
///
/// Serialized as JSON tagged by `type`, e.g.
/// `{"type":"pause_messaging"}` or `{"type":"start_messaging","rows":[...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Begin a session over the given rows.
    StartMessaging {
        /// Validated rows in delivery order.
        rows: Vec<ContactRow>,
    },
    /// Pause the running session.
    PauseMessaging,
    /// Resume a paused session.
    ResumeMessaging,
    /// Cancel the session.
    CancelMessaging,
    /// Return a finished session to idle.
    ResetMessaging,
}

impl ControlRequest {
    /// Parse one line of operator input.
    ///
    /// Accepts a JSON request or one of the bare keywords `pause`, `resume`,
    /// `cancel`, `reset` (with or without the `_messaging` suffix).
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidRequest`] for anything else.
    pub fn parse_line(line: &str) -> Result<Self, MessagingError> {
        let line = line.trim();
        if line.starts_with('{') {
            return serde_json::from_str(line)
                .map_err(|e| MessagingError::InvalidRequest(format!("malformed request: {e}")));
        }
        let keyword = line.to_ascii_lowercase();
        match keyword.trim_end_matches("_messaging") {
            "pause" => Ok(Self::PauseMessaging),
            "resume" => Ok(Self::ResumeMessaging),
            "cancel" => Ok(Self::CancelMessaging),
            "reset" => Ok(Self::ResetMessaging),
            "" => Err(MessagingError::InvalidRequest("empty request".to_owned())),
            other => Err(MessagingError::InvalidRequest(format!(
                "unknown request: {other}"
            ))),
        }
    }
}
