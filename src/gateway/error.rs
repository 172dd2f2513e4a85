//! Gateway error types

use thiserror::Error;

/// Failed command round trip. Opaque to the engine apart from its kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{command}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub command: &'static str,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, command: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            command,
            message: message.into(),
        }
    }

    pub fn transport(command: &'static str, message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Transport, command, message)
    }

    pub fn rejected(command: &'static str, message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Rejected, command, message)
    }

    pub fn unexpected_reply(command: &'static str, reply: &str) -> Self {
        Self::new(
            GatewayErrorKind::UnexpectedReply,
            command,
            format!("unexpected reply: {reply}"),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// The round trip itself failed (connection, IPC, serialization)
    Transport,
    /// The backend refused the command
    Rejected,
    /// The backend answered with a reply shape the command does not produce
    UnexpectedReply,
}
