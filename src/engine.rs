//! Engine wiring
//!
//! Owns the message controller and the tool manager over one logged gateway,
//! and drains the push-event channel into the controller.

use crate::chat::MessageController;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::gateway::{self, EventReceiver, EventSender, Gateway, GatewayEvent, LoggingGateway};
use crate::tools::ToolManager;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct SyncEngine<G> {
    config: SyncConfig,
    gateway: Arc<LoggingGateway<G>>,
    chat: MessageController<LoggingGateway<G>>,
    tools: ToolManager<LoggingGateway<G>>,
}

impl<G: Gateway + 'static> SyncEngine<G> {
    pub fn new(gateway: G, config: SyncConfig) -> Self {
        let gateway = Arc::new(LoggingGateway::new(gateway));
        Self {
            chat: MessageController::new(Arc::clone(&gateway), config.update_capacity),
            tools: ToolManager::new(Arc::clone(&gateway), config.prune_unknown_tools),
            gateway,
            config,
        }
    }

    /// Load the tool catalog so optimistic writes have a snapshot to check
    pub async fn initialize(&self) -> Result<(), SyncError> {
        let catalog = self.tools.load_catalog().await?;
        tracing::info!(tools = catalog.len(), revision = catalog.revision(), "Engine initialized");
        Ok(())
    }

    pub fn chat(&self) -> &MessageController<LoggingGateway<G>> {
        &self.chat
    }

    pub fn tools(&self) -> &ToolManager<LoggingGateway<G>> {
        &self.tools
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        self.gateway.inner()
    }

    /// Create a push-event channel sized from the configuration. The sender
    /// goes to the gateway implementation, the receiver to `spawn_event_pump`.
    pub fn event_channel(&self) -> (EventSender, EventReceiver) {
        gateway::event_channel(self.config.event_queue_capacity)
    }

    /// Apply one push event. Stale events are expected and only logged.
    pub fn handle_event(&self, event: GatewayEvent) {
        let message_id = event.message_id().to_string();
        match self.chat.handle_event(event) {
            Ok(()) => {}
            Err(e) if e.is_stale() => {
                tracing::debug!(message_id = %message_id, error = %e, "Dropped stale push event");
            }
            Err(e) => {
                tracing::error!(message_id = %message_id, error = %e, "Error handling push event");
            }
        }
    }

    /// Drain the push-event channel until every sender is gone. Events are
    /// applied one at a time in arrival order.
    pub async fn run_events(self: Arc<Self>, mut events: EventReceiver) {
        tracing::debug!("Event pump started");
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        tracing::debug!("Event pump stopped");
    }

    pub fn spawn_event_pump(self: &Arc<Self>, events: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run_events(events))
    }
}
