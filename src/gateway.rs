//! Command/event gateway contract
//!
//! The backend is reachable only through request/response commands plus an
//! out-of-band push-event channel. This module defines that two-directional
//! contract; it implements no transport of its own.

mod command;
mod error;
mod event;
mod memory;

pub use command::{Command, NewTool, Reply, ToolUpdate};
pub use error::{GatewayError, GatewayErrorKind};
pub use event::{CompletionStatus, GatewayEvent};
pub use memory::InMemoryBackend;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub type SessionId = String;
pub type MessageId = String;
pub type ToolId = String;
pub type RecordingId = String;

/// Sending half of the push-event channel, held by the gateway implementation
pub type EventSender = mpsc::Sender<GatewayEvent>;
/// Receiving half of the push-event channel, drained by the engine
pub type EventReceiver = mpsc::Receiver<GatewayEvent>;

/// Create the push-event channel
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Request/response half of the backend contract
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Execute one command round trip
    async fn invoke(&self, command: Command) -> Result<Reply, GatewayError>;
}

#[async_trait]
impl<T: Gateway + ?Sized> Gateway for Arc<T> {
    async fn invoke(&self, command: Command) -> Result<Reply, GatewayError> {
        (**self).invoke(command).await
    }
}

/// Logging wrapper for gateways
pub struct LoggingGateway<G> {
    inner: G,
}

impl<G: Gateway> LoggingGateway<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: Gateway> Gateway for LoggingGateway<G> {
    async fn invoke(&self, command: Command) -> Result<Reply, GatewayError> {
        let name = command.name();
        let start = std::time::Instant::now();
        let result = self.inner.invoke(command).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::debug!(
                    command = name,
                    duration_ms = %duration.as_millis(),
                    "Gateway command completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    command = name,
                    duration_ms = %duration.as_millis(),
                    kind = ?e.kind,
                    error = %e.message,
                    "Gateway command failed"
                );
            }
        }

        result
    }
}
