//! Push events delivered out of band by the backend

use super::{MessageId, SessionId};
use serde::{Deserialize, Serialize};

/// Events keyed by message identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A streamed token delta
    Token {
        message_id: MessageId,
        token: String,
        /// Backend's view of the content so far, when it sends one
        #[serde(default)]
        cumulative_content: Option<String>,
    },
    /// Generation finished
    Complete {
        message_id: MessageId,
        status: CompletionStatus,
        #[serde(default)]
        error: Option<String>,
        /// Owning session and final content, sent when the message originated
        /// elsewhere (another client, a backend-side run)
        #[serde(default)]
        session_id: Option<SessionId>,
        #[serde(default)]
        content: Option<String>,
    },
}

impl GatewayEvent {
    pub fn message_id(&self) -> &str {
        match self {
            GatewayEvent::Token { message_id, .. } | GatewayEvent::Complete { message_id, .. } => {
                message_id
            }
        }
    }

    pub fn token(message_id: impl Into<MessageId>, token: impl Into<String>) -> Self {
        GatewayEvent::Token {
            message_id: message_id.into(),
            token: token.into(),
            cumulative_content: None,
        }
    }

    pub fn complete(message_id: impl Into<MessageId>) -> Self {
        GatewayEvent::Complete {
            message_id: message_id.into(),
            status: CompletionStatus::Complete,
            error: None,
            session_id: None,
            content: None,
        }
    }

    /// A completed message this client has not seen before
    pub fn completed_elsewhere(
        message_id: impl Into<MessageId>,
        session_id: impl Into<SessionId>,
        content: impl Into<String>,
    ) -> Self {
        GatewayEvent::Complete {
            message_id: message_id.into(),
            status: CompletionStatus::Complete,
            error: None,
            session_id: Some(session_id.into()),
            content: Some(content.into()),
        }
    }

    pub fn failed(message_id: impl Into<MessageId>, error: impl Into<String>) -> Self {
        GatewayEvent::Complete {
            message_id: message_id.into(),
            status: CompletionStatus::Error,
            error: Some(error.into()),
            session_id: None,
            content: None,
        }
    }
}

/// Final status reported by a completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Complete,
    Error,
}
