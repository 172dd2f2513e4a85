//! Chat message lifecycle
//!
//! Messages move through `pending -> streaming -> complete | error | cancelled`
//! as send intents and push events arrive. The transition table is pure; the
//! controller owns the message table and performs the gateway I/O.

mod controller;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use controller::MessageController;
pub use state::{ChatMessage, ChatSession, MessageStatus, Role, SentMessages};
pub use transition::{transition, Effect, MessageEvent, TransitionError, TransitionResult};
