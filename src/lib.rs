//! Session state synchronization engine
//!
//! Keeps a client-side view of chat messages and tool assignments consistent
//! with a backend reachable only through request/response commands and an
//! out-of-band stream of push events.

pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod replay;
pub mod telemetry;
pub mod tools;

#[cfg(test)]
mod testing;

pub use chat::{ChatMessage, ChatSession, MessageController, MessageStatus, Role, SentMessages};
pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{StaleReason, SyncError};
pub use gateway::{Command, Gateway, GatewayError, GatewayEvent, InMemoryBackend, LoggingGateway, Reply};
pub use tools::{Confirmation, SessionToolAssignment, Tool, ToolCatalog, ToolKind, ToolManager};
