//! Engine error taxonomy

use crate::gateway::GatewayError;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the controller and the tool manager
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// A command round trip failed. The affected entity has already been
    /// reverted or marked `error` when this is returned.
    #[error("transport error: {0}")]
    Transport(#[from] GatewayError),

    /// Malformed input, rejected before any command was issued
    #[error("invalid input: {0}")]
    Validation(String),

    /// The target id is not tracked or can no longer change
    #[error("stale reference to {entity} {id}: {reason}")]
    StaleReference {
        entity: &'static str,
        id: String,
        reason: StaleReason,
    },
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation(message.into())
    }

    pub fn unknown_message(id: impl Into<String>) -> Self {
        SyncError::StaleReference {
            entity: "message",
            id: id.into(),
            reason: StaleReason::Unknown,
        }
    }

    pub fn terminal_message(id: impl Into<String>, status: &'static str) -> Self {
        SyncError::StaleReference {
            entity: "message",
            id: id.into(),
            reason: StaleReason::Terminal(status),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, SyncError::StaleReference { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Never tracked locally, or re-keyed away
    Unknown,
    /// Already in the named terminal status
    Terminal(&'static str),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Unknown => write!(f, "not tracked"),
            StaleReason::Terminal(status) => write!(f, "already {status}"),
        }
    }
}
