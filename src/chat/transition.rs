//! Pure message lifecycle transitions
//!
//! Given the same status and event this always produces the same result and
//! performs no I/O. The controller applies the returned status and effects.

use super::MessageStatus;
use thiserror::Error;

const UNSPECIFIED_ERROR: &str = "generation failed without details";

/// Inputs to the message lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// A streamed token delta
    Token(String),
    /// Generation finished successfully
    Complete,
    /// Generation or delivery failed
    Fail { error: Option<String> },
    /// User cancelled the message
    Cancel,
}

/// Side effects the controller must carry out after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append to the message content
    AppendContent(String),
    /// Tell the backend to stop generating
    RequestCancel,
}

/// Result of a state transition
#[derive(Debug, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_status: MessageStatus,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(status: MessageStatus) -> Self {
        Self {
            new_status: status,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("message is already {0}")]
    Terminal(&'static str),
}

/// Lifecycle transition table
///
/// pending -> streaming on the first token; pending or streaming ->
/// complete | error | cancelled. No transition leaves a terminal status.
pub fn transition(
    status: &MessageStatus,
    event: MessageEvent,
) -> Result<TransitionResult, TransitionError> {
    match (status, event) {
        (MessageStatus::Pending | MessageStatus::Streaming, MessageEvent::Token(token)) => {
            Ok(TransitionResult::new(MessageStatus::Streaming)
                .with_effect(Effect::AppendContent(token)))
        }

        (MessageStatus::Pending | MessageStatus::Streaming, MessageEvent::Complete) => {
            Ok(TransitionResult::new(MessageStatus::Complete))
        }

        (MessageStatus::Pending | MessageStatus::Streaming, MessageEvent::Fail { error }) => {
            Ok(TransitionResult::new(MessageStatus::Error {
                message: error.unwrap_or_else(|| UNSPECIFIED_ERROR.to_string()),
            }))
        }

        (MessageStatus::Pending | MessageStatus::Streaming, MessageEvent::Cancel) => {
            Ok(TransitionResult::new(MessageStatus::Cancelled).with_effect(Effect::RequestCancel))
        }

        (
            terminal @ (MessageStatus::Complete | MessageStatus::Error { .. } | MessageStatus::Cancelled),
            _,
        ) => Err(TransitionError::Terminal(terminal.as_str())),
    }
}
