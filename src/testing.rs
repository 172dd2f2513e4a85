//! Test doubles for the gateway contract

use crate::gateway::{Command, Gateway, GatewayError, Reply};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A checkpoint a held command waits at until the test releases it
#[derive(Debug, Default)]
pub struct Gate {
    reached: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until a held command has arrived at the gate
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the held command through to the inner gateway
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Gateway wrapper that can hold commands by name mid-flight, so tests can
/// observe state while a round trip is outstanding
pub struct GatedGateway<G> {
    inner: G,
    gates: Mutex<HashMap<&'static str, Arc<Gate>>>,
}

impl<G: Gateway> GatedGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Hold every later invocation of `command` until released
    pub fn hold(&self, command: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.lock().unwrap().insert(command, Arc::clone(&gate));
        gate
    }

    /// Stop holding `command`. Calls already waiting stay held.
    pub fn clear(&self, command: &str) {
        self.gates.lock().unwrap().remove(command);
    }
}

#[async_trait]
impl<G: Gateway> Gateway for GatedGateway<G> {
    async fn invoke(&self, command: Command) -> Result<Reply, GatewayError> {
        let gate = self.gates.lock().unwrap().get(command.name()).cloned();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        self.inner.invoke(command).await
    }
}
