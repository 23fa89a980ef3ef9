// Wire models for the chat server
//
// Shapes shared by the REST API and the push channel. Fields use
// `#[serde(default)]` where the server omits them on older payloads.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── MessageId ────────────────────────────────────────────────────────

/// Opaque server-issued message identifier.
///
/// Two messages with the same id are the same logical message no matter
/// which transport delivered them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Message ──────────────────────────────────────────────────────────

/// A chat message as stored and broadcast by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Request body for `POST /api/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub is_admin: bool,
}

// ── Push frames ──────────────────────────────────────────────────────

/// One event delivered by the push channel.
///
/// Framed as `{"type": "new_message", "data": <Message>}` or
/// `{"type": "message_deleted", "data": {"message_id": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    NewMessage(Message),
    MessageDeleted { message_id: MessageId },
}

impl InboundEvent {
    /// The id of the message this event refers to.
    pub fn message_id(&self) -> &MessageId {
        match self {
            Self::NewMessage(m) => &m.id,
            Self::MessageDeleted { message_id } => message_id,
        }
    }
}

// ── Admin ────────────────────────────────────────────────────────────

/// Response from `POST /api/admin/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
}

/// Response from `DELETE /api/admin/messages/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Error body the server sends alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: String,
}

// ── Timestamps ───────────────────────────────────────────────────────

/// Lenient timestamp codec.
///
/// The server emits RFC 3339 in some paths and naive UTC datetimes in
/// others (`2024-05-01T12:00:00.123456` over REST, `2024-05-01 12:00:00.123456`
/// inside push frames). Naive values are read as UTC. Output is always RFC 3339.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("unrecognized timestamp: {raw}")))
    }
}
