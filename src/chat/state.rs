//! Chat message and session types

use crate::gateway::{MessageId, RecordingId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversational context scoping chat messages and a tool set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    /// Owning recording (relation only)
    pub recording_id: RecordingId,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(id: impl Into<SessionId>, recording_id: impl Into<RecordingId>) -> Self {
        Self {
            id: id.into(),
            recording_id: recording_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Lifecycle status of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MessageStatus {
    /// Created, no token received yet
    #[default]
    Pending,
    /// At least one token received
    Streaming,
    /// Generation finished (terminal)
    Complete,
    /// Generation or send failed (terminal)
    Error { message: String },
    /// Cancelled by the user (terminal)
    Cancelled,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            MessageStatus::Pending | MessageStatus::Streaming => false,
            MessageStatus::Complete | MessageStatus::Error { .. } | MessageStatus::Cancelled => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Streaming => "streaming",
            MessageStatus::Complete => "complete",
            MessageStatus::Error { .. } => "error",
            MessageStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    /// Append-only while the status is non-terminal
    pub content: String,
    /// Strictly increasing within a session
    pub sequence: u64,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            MessageStatus::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Ids returned by a successful send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessages {
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
}
