// ── Domain types ──
//
// Message types come straight from the wire crate; the session layer adds
// the identity a user joins under and the client-side view of the stream.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

pub use backchat_api::models::{InboundEvent, Message, MessageId, NewMessage};

use crate::error::CoreError;

// ── Identity ────────────────────────────────────────────────────────

/// Display name a session joins under.
///
/// Also addresses the push channel (`/ws/{identity}`). The name is
/// user-chosen and unauthenticated; it is trimmed and must not be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "username must not be empty".into(),
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reject blank message bodies before they reach the server.
pub fn validate_content(content: &str) -> Result<(), CoreError> {
    if content.trim().is_empty() {
        return Err(CoreError::ValidationFailed {
            message: "message must not be empty".into(),
        });
    }
    Ok(())
}

// ── ConnectionMode ──────────────────────────────────────────────────

/// Which delivery path currently feeds the message view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    Push,
    Poll,
    Disconnected,
}

// ── ClientState ─────────────────────────────────────────────────────

/// Point-in-time view of a session: the visible messages plus link status.
#[derive(Debug, Clone, Serialize)]
pub struct ClientState {
    pub messages: Arc<Vec<Arc<Message>>>,
    pub connection_mode: ConnectionMode,
    pub retry_count: u32,
}
