//! Database models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Conversation state for one (bot, user) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SessionRecord {
    /// Brain/bot identifier.
    pub bot_id: String,
    /// Channel-level user identifier.
    pub user_id: String,
    /// External agent session handle; `None` means "start fresh".
    pub agent_session_uuid: Option<String>,
    /// Number of user messages handled in this conversation.
    pub message_count: i64,
    /// RFC 3339 timestamp of the user's last message.
    pub last_message_at: Option<String>,
    /// Per-user voice override; `None` means "use brain default".
    pub tts_preference: Option<bool>,
    /// Row creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
}

impl SessionRecord {
    /// Parse `last_message_at` into a UTC timestamp, when present and valid.
    pub fn last_message_time(&self) -> Option<DateTime<Utc>> {
        self.last_message_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// One entry in a pair's nudge history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NudgeRecord {
    /// Auto-incrementing ID (history order).
    pub id: i64,
    /// Brain/bot identifier.
    pub bot_id: String,
    /// Channel-level user identifier.
    pub user_id: String,
    /// RFC 3339 send timestamp.
    pub sent_at: String,
    /// The trigger tier that fired, in hours.
    pub delay_hours: f64,
    /// The delivered follow-up text.
    pub message: String,
    /// Whether the user has replied since this nudge.
    pub responded: bool,
}
