//! Tool catalog and per-session assignment manager

use super::assignment::{Acknowledgement, AssignmentTable, SessionToolAssignment};
use super::catalog::{unique_ids, Tool, ToolCatalog};
use crate::error::SyncError;
use crate::gateway::{Command, Gateway, NewTool, SessionId, ToolId, ToolUpdate};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Owns the catalog and the session assignments. All writes to either go
/// through this type; locks are never held across a gateway call.
pub struct ToolManager<G> {
    gateway: Arc<G>,
    catalog: Mutex<Arc<ToolCatalog>>,
    assignments: Mutex<AssignmentTable>,
    prune_unknown: bool,
}

impl<G: Gateway> ToolManager<G> {
    pub fn new(gateway: Arc<G>, prune_unknown: bool) -> Self {
        Self {
            gateway,
            catalog: Mutex::new(Arc::new(ToolCatalog::default())),
            assignments: Mutex::new(AssignmentTable::default()),
            prune_unknown,
        }
    }

    // ==================== Catalog ====================

    /// Current catalog snapshot
    pub fn catalog(&self) -> Arc<ToolCatalog> {
        Arc::clone(&self.catalog_slot())
    }

    /// Replace the catalog wholesale from the backend
    pub async fn load_catalog(&self) -> Result<Arc<ToolCatalog>, SyncError> {
        let command = Command::ListTools;
        let name = command.name();
        let tools = self.gateway.invoke(command).await?.into_tools(name)?;

        let mut slot = self.catalog_slot();
        let catalog = Arc::new(ToolCatalog::with_revision(slot.revision() + 1, tools));
        *slot = Arc::clone(&catalog);
        drop(slot);

        tracing::info!(
            revision = catalog.revision(),
            tools = catalog.len(),
            "Tool catalog loaded"
        );
        Ok(catalog)
    }

    pub async fn toggle_enabled(&self, tool_id: &str, enabled: bool) -> Result<Arc<ToolCatalog>, SyncError> {
        self.mutate_catalog(Command::SetToolEnabled {
            tool_id: tool_id.to_string(),
            enabled,
        })
        .await
    }

    pub async fn set_default(&self, tool_id: &str, is_default: bool) -> Result<Arc<ToolCatalog>, SyncError> {
        self.mutate_catalog(Command::SetToolDefault {
            tool_id: tool_id.to_string(),
            is_default,
        })
        .await
    }

    /// Create a user-defined tool and reload the catalog
    pub async fn create_tool(&self, tool: NewTool) -> Result<Tool, SyncError> {
        validate_name(&tool.name)?;
        let command = Command::CreateTool { tool };
        let name = command.name();
        let created = self.gateway.invoke(command).await?.into_tool(name)?;
        tracing::info!(tool_id = %created.id, "Tool created");
        self.load_catalog().await?;
        Ok(created)
    }

    pub async fn update_tool(&self, tool_id: &str, update: ToolUpdate) -> Result<Arc<ToolCatalog>, SyncError> {
        if update.is_empty() {
            return Err(SyncError::validation("tool update changes nothing"));
        }
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        self.mutate_catalog(Command::UpdateTool {
            tool_id: tool_id.to_string(),
            update,
        })
        .await
    }

    pub async fn delete_tool(&self, tool_id: &str) -> Result<Arc<ToolCatalog>, SyncError> {
        self.mutate_catalog(Command::DeleteTool {
            tool_id: tool_id.to_string(),
        })
        .await
    }

    /// Non-optimistic catalog mutation: backend first, then a full reload.
    /// On failure the current catalog is left as it was.
    async fn mutate_catalog(&self, command: Command) -> Result<Arc<ToolCatalog>, SyncError> {
        let name = command.name();
        self.gateway.invoke(command).await?.into_ack(name)?;
        self.load_catalog().await
    }

    // ==================== Session assignments ====================

    pub fn session_tools(&self, session_id: &str) -> Option<SessionToolAssignment> {
        self.table().get(session_id).cloned()
    }

    pub fn all_session_tools(&self) -> Vec<SessionToolAssignment> {
        self.table().all().cloned().collect()
    }

    /// Error left by the last failed optimistic write, if any
    pub fn session_error(&self, session_id: &str) -> Option<String> {
        self.table().error(session_id).map(ToString::to_string)
    }

    /// Replace the session assignment wholesale from the backend
    pub async fn load_session_tools(&self, session_id: &str) -> Result<Vec<ToolId>, SyncError> {
        validate_session(session_id)?;
        let tool_ids = self.fetch_session_tools(session_id).await?;
        let mut table = self.table();
        table.replace_confirmed(session_id, tool_ids.clone());
        table.clear_error(session_id);
        Ok(tool_ids)
    }

    /// Ask the backend to seed the session with default tools, then reload
    pub async fn init_session_tools(&self, session_id: &str) -> Result<Vec<ToolId>, SyncError> {
        validate_session(session_id)?;
        let command = Command::InitSessionTools {
            session_id: session_id.to_string(),
        };
        let name = command.name();
        self.gateway.invoke(command).await?.into_ack(name)?;
        self.load_session_tools(session_id).await
    }

    /// Set the tools of a session.
    ///
    /// With a catalog snapshot the resolved selection is shown immediately as
    /// a tentative assignment. If the backend then rejects the write, the
    /// assignment is reloaded from the backend, not restored from the value
    /// held before the call, and the session error indicator is set.
    ///
    /// Without a snapshot local state only changes after the backend accepts.
    pub async fn set_session_tools(
        &self,
        session_id: &str,
        tool_ids: Vec<ToolId>,
        catalog: Option<&ToolCatalog>,
    ) -> Result<(), SyncError> {
        validate_session(session_id)?;
        match catalog {
            Some(catalog) => {
                let resolved = catalog.resolve(&tool_ids, self.prune_unknown);
                self.set_optimistic(session_id, resolved).await
            }
            None => self.set_confirmed(session_id, tool_ids).await,
        }
    }

    async fn set_optimistic(&self, session_id: &str, tool_ids: Vec<ToolId>) -> Result<(), SyncError> {
        let generation = self.table().apply_tentative(session_id, tool_ids.clone());
        tracing::debug!(session_id, generation, tools = tool_ids.len(), "Applied tentative tool selection");

        match self.write_session_tools(session_id, tool_ids).await {
            Ok(()) => {
                let outcome = {
                    let mut table = self.table();
                    let outcome = table.acknowledge(session_id, generation);
                    if outcome == Acknowledgement::Confirmed {
                        table.clear_error(session_id);
                    }
                    outcome
                };
                match outcome {
                    Acknowledgement::Confirmed => {}
                    Acknowledgement::SupersededByWrite => {
                        tracing::debug!(session_id, generation, "Tool selection superseded by a newer write");
                    }
                    Acknowledgement::SupersededByReload => {
                        // The reload may have read the backend before this write landed
                        tracing::info!(session_id, generation, "Tool selection acknowledged after a reload, reloading again");
                        self.reconcile(session_id).await;
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Tool selection rejected, reloading from backend");
                self.table().set_error(session_id, e.to_string());
                self.reconcile(session_id).await;
                Err(e)
            }
        }
    }

    async fn set_confirmed(&self, session_id: &str, tool_ids: Vec<ToolId>) -> Result<(), SyncError> {
        let tool_ids = unique_ids(tool_ids);
        self.write_session_tools(session_id, tool_ids.clone()).await?;
        let mut table = self.table();
        table.replace_confirmed(session_id, tool_ids);
        table.clear_error(session_id);
        Ok(())
    }

    /// Replace local state with backend truth after a rejected write, or
    /// after an acknowledged write found a reload had replaced it. Any error
    /// indicator is kept.
    async fn reconcile(&self, session_id: &str) {
        match self.fetch_session_tools(session_id).await {
            Ok(tool_ids) => {
                tracing::info!(session_id, tools = tool_ids.len(), "Tool selection reconciled with backend");
                self.table().replace_confirmed(session_id, tool_ids);
            }
            Err(e) => {
                // Local state is left as is; the next successful load replaces it.
                tracing::warn!(session_id, error = %e, "Reconciliation reload failed");
            }
        }
    }

    async fn write_session_tools(&self, session_id: &str, tool_ids: Vec<ToolId>) -> Result<(), SyncError> {
        let command = Command::SetSessionTools {
            session_id: session_id.to_string(),
            tool_ids,
        };
        let name = command.name();
        self.gateway.invoke(command).await?.into_ack(name)?;
        Ok(())
    }

    async fn fetch_session_tools(&self, session_id: &str) -> Result<Vec<ToolId>, SyncError> {
        let command = Command::GetSessionTools {
            session_id: SessionId::from(session_id),
        };
        let name = command.name();
        Ok(self.gateway.invoke(command).await?.into_tool_ids(name)?)
    }

    fn catalog_slot(&self) -> MutexGuard<'_, Arc<ToolCatalog>> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn table(&self) -> MutexGuard<'_, AssignmentTable> {
        self.assignments.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_session(session_id: &str) -> Result<(), SyncError> {
    if session_id.trim().is_empty() {
        return Err(SyncError::validation("session id is empty"));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), SyncError> {
    if name.trim().is_empty() {
        return Err(SyncError::validation("tool name is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryBackend;
    use crate::testing::GatedGateway;
    use crate::tools::Confirmation;

    fn ids(raw: &[&str]) -> Vec<ToolId> {
        raw.iter().map(ToString::to_string).collect()
    }

    fn backend() -> Arc<InMemoryBackend> {
        Arc::new(InMemoryBackend::new(vec![
            Tool::builtin("t1", "Search").as_default(),
            Tool::custom("t2", "Summarize"),
            Tool::mcp("t3", "Issues", "gh", "GitHub").as_default(),
        ]))
    }

    async fn loaded_manager(backend: &Arc<InMemoryBackend>) -> ToolManager<Arc<InMemoryBackend>> {
        let manager = ToolManager::new(Arc::new(Arc::clone(backend)), true);
        manager.load_catalog().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_load_catalog_bumps_revision() {
        let backend = backend();
        let manager = loaded_manager(&backend).await;
        assert_eq!(manager.catalog().revision(), 1);
        assert_eq!(manager.catalog().len(), 3);

        let reloaded = manager.load_catalog().await.unwrap();
        assert_eq!(reloaded.revision(), 2);
    }

    #[tokio::test]
    async fn test_optimistic_write_confirmed_on_success() {
        let backend = backend();
        let manager = loaded_manager(&backend).await;
        let catalog = manager.catalog();

        manager
            .set_session_tools("s1", ids(&["t1", "t2"]), Some(&*catalog))
            .await
            .unwrap();

        let assignment = manager.session_tools("s1").unwrap();
        assert_eq!(assignment.tool_ids, ids(&["t1", "t2"]));
        assert_eq!(assignment.confirmation, Confirmation::Confirmed);
        assert_eq!(backend.session_tools("s1"), ids(&["t1", "t2"]));
        assert!(manager.session_error("s1").is_none());
    }

    #[tokio::test]
    async fn test_failed_optimistic_write_reloads_backend_state() {
        let backend = backend();
        backend.write_session_tools("s1", ids(&["t2"]));
        let manager = loaded_manager(&backend).await;
        manager.load_session_tools("s1").await.unwrap();
        let catalog = manager.catalog();

        // Another writer changes the backend, then our write is rejected
        backend.write_session_tools("s1", ids(&["t1", "t3"]));
        backend.fail_next("tools.setForSession");

        let err = manager
            .set_session_tools("s1", ids(&["t1", "t2"]), Some(&*catalog))
            .await
            .unwrap_err();
        assert!(err.is_transport());

        let assignment = manager.session_tools("s1").unwrap();
        assert_eq!(assignment.tool_ids, ids(&["t1", "t3"]));
        assert!(assignment.is_confirmed());
        assert!(manager.session_error("s1").is_some());
    }

    #[tokio::test]
    async fn test_optimistic_state_visible_while_call_pending() {
        let backend = backend();
        let gated = Arc::new(GatedGateway::new(Arc::clone(&backend)));
        let gate = gated.hold("tools.setForSession");
        let manager = Arc::new(ToolManager::new(Arc::clone(&gated), true));
        manager.load_catalog().await.unwrap();
        let catalog = manager.catalog();

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .set_session_tools("s1", ids(&["t1", "t2"]), Some(&*catalog))
                    .await
            })
        };

        gate.reached().await;
        let pending = manager.session_tools("s1").unwrap();
        assert_eq!(pending.tool_ids, ids(&["t1", "t2"]));
        assert_eq!(pending.confirmation, Confirmation::Tentative);

        // The backend changes underneath, then rejects the pending write
        backend.write_session_tools("s1", ids(&["t1", "t3"]));
        backend.fail_next("tools.setForSession");
        gate.release();

        assert!(task.await.unwrap().is_err());
        assert_eq!(manager.session_tools("s1").unwrap().tool_ids, ids(&["t1", "t3"]));
    }

    #[tokio::test]
    async fn test_later_write_wins_over_earlier_acknowledgement() {
        let backend = backend();
        let gated = Arc::new(GatedGateway::new(Arc::clone(&backend)));
        let gate = gated.hold("tools.setForSession");
        let manager = Arc::new(ToolManager::new(Arc::clone(&gated), true));
        manager.load_catalog().await.unwrap();
        let catalog = manager.catalog();

        let first = {
            let manager = Arc::clone(&manager);
            let catalog = Arc::clone(&catalog);
            tokio::spawn(async move {
                manager
                    .set_session_tools("s1", ids(&["t1"]), Some(&*catalog))
                    .await
            })
        };
        gate.reached().await;

        // Second write is not held; it lands and is acknowledged first
        gated.clear("tools.setForSession");
        manager
            .set_session_tools("s1", ids(&["t2"]), Some(&*catalog))
            .await
            .unwrap();
        gate.release();
        first.await.unwrap().unwrap();

        // Local state shows the later call; the earlier ack did not confirm over it
        let assignment = manager.session_tools("s1").unwrap();
        assert_eq!(assignment.tool_ids, ids(&["t2"]));
        assert!(assignment.is_confirmed());
    }

    #[tokio::test]
    async fn test_write_acknowledged_after_failed_reconcile_wins() {
        let backend = backend();
        let gated = Arc::new(GatedGateway::new(Arc::clone(&backend)));
        let manager = Arc::new(ToolManager::new(Arc::clone(&gated), true));
        manager.load_catalog().await.unwrap();
        let catalog = manager.catalog();

        let spawn_write = |tool_ids: Vec<ToolId>| {
            let manager = Arc::clone(&manager);
            let catalog = Arc::clone(&catalog);
            tokio::spawn(async move {
                manager
                    .set_session_tools("s1", tool_ids, Some(&*catalog))
                    .await
            })
        };

        let first_gate = gated.hold("tools.setForSession");
        let first = spawn_write(ids(&["t1"]));
        first_gate.reached().await;
        let second_gate = gated.hold("tools.setForSession");
        let second = spawn_write(ids(&["t2"]));
        second_gate.reached().await;
        gated.clear("tools.setForSession");

        // The first write is rejected and reconciles before the second lands
        backend.fail_next("tools.setForSession");
        first_gate.release();
        assert!(first.await.unwrap().is_err());
        let reconciled = manager.session_tools("s1").unwrap();
        assert!(reconciled.tool_ids.is_empty());
        assert!(reconciled.is_confirmed());

        second_gate.release();
        second.await.unwrap().unwrap();

        let assignment = manager.session_tools("s1").unwrap();
        assert_eq!(backend.session_tools("s1"), ids(&["t2"]));
        assert_eq!(assignment.tool_ids, ids(&["t2"]));
        assert!(assignment.is_confirmed());
        // The rejection of the first write is still reported
        assert!(manager.session_error("s1").is_some());
    }

    #[tokio::test]
    async fn test_write_acknowledged_after_load_is_reloaded() {
        let backend = backend();
        let gated = Arc::new(GatedGateway::new(Arc::clone(&backend)));
        let manager = Arc::new(ToolManager::new(Arc::clone(&gated), true));
        manager.load_catalog().await.unwrap();
        let catalog = manager.catalog();

        let gate = gated.hold("tools.setForSession");
        let write = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .set_session_tools("s1", ids(&["t1", "t3"]), Some(&*catalog))
                    .await
            })
        };
        gate.reached().await;

        // A load reads the backend before the write reaches it
        manager.load_session_tools("s1").await.unwrap();
        assert!(manager.session_tools("s1").unwrap().tool_ids.is_empty());

        gate.release();
        write.await.unwrap().unwrap();

        let assignment = manager.session_tools("s1").unwrap();
        assert_eq!(assignment.tool_ids, ids(&["t1", "t3"]));
        assert_eq!(assignment.tool_ids, backend.session_tools("s1"));
        assert!(assignment.is_confirmed());
    }

    #[tokio::test]
    async fn test_non_optimistic_write_drops_duplicates() {
        let backend = backend();
        let manager = loaded_manager(&backend).await;

        manager
            .set_session_tools("s1", ids(&["t2", "t1", "t2"]), None)
            .await
            .unwrap();
        assert_eq!(manager.session_tools("s1").unwrap().tool_ids, ids(&["t2", "t1"]));
        assert_eq!(backend.session_tools("s1"), ids(&["t2", "t1"]));
    }

    #[tokio::test]
    async fn test_non_optimistic_failure_leaves_state() {
        let backend = backend();
        backend.write_session_tools("s1", ids(&["t2"]));
        let manager = loaded_manager(&backend).await;
        manager.load_session_tools("s1").await.unwrap();

        backend.fail_next("tools.setForSession");
        let err = manager
            .set_session_tools("s1", ids(&["t1"]), None)
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(manager.session_tools("s1").unwrap().tool_ids, ids(&["t2"]));
        assert!(manager.session_error("s1").is_none());
    }

    #[tokio::test]
    async fn test_unknown_ids_pruned_from_optimistic_write() {
        let backend = backend();
        let manager = loaded_manager(&backend).await;
        let catalog = manager.catalog();

        manager
            .set_session_tools("s1", ids(&["t3", "gone", "t3"]), Some(&*catalog))
            .await
            .unwrap();
        assert_eq!(manager.session_tools("s1").unwrap().tool_ids, ids(&["t3"]));
    }

    #[tokio::test]
    async fn test_init_seeds_defaults() {
        let backend = backend();
        let manager = loaded_manager(&backend).await;

        let seeded = manager.init_session_tools("s9").await.unwrap();
        assert_eq!(seeded, ids(&["t1", "t3"]));
        assert!(manager.session_tools("s9").unwrap().is_confirmed());
    }

    #[tokio::test]
    async fn test_toggle_enabled_reloads_catalog() {
        let backend = backend();
        let manager = loaded_manager(&backend).await;

        let catalog = manager.toggle_enabled("t1", false).await.unwrap();
        assert_eq!(catalog.revision(), 2);
        assert!(!catalog.get("t1").unwrap().enabled);
        assert!(catalog.default_tools().iter().all(|t| t.id != "t1"));
    }

    #[tokio::test]
    async fn test_failed_set_default_keeps_catalog() {
        let backend = backend();
        let manager = loaded_manager(&backend).await;

        backend.fail_next("tools.setDefault");
        assert!(manager.set_default("t2", true).await.is_err());
        assert_eq!(manager.catalog().revision(), 1);
        assert!(!manager.catalog().get("t2").unwrap().is_default);
    }

    #[tokio::test]
    async fn test_create_update_delete_tool() {
        let backend = backend();
        let manager = loaded_manager(&backend).await;

        let created = manager
            .create_tool(NewTool {
                name: "Translate".to_string(),
                description: None,
            })
            .await
            .unwrap();
        assert!(manager.catalog().custom_tools().iter().any(|t| t.id == created.id));

        let catalog = manager
            .update_tool(
                &created.id,
                ToolUpdate {
                    name: Some("Translator".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(catalog.get(&created.id).unwrap().name, "Translator");

        let catalog = manager.delete_tool(&created.id).await.unwrap();
        assert!(!catalog.contains(&created.id));
    }

    #[tokio::test]
    async fn test_validation_rejects_before_command() {
        let backend = backend();
        let manager = loaded_manager(&backend).await;
        let calls = backend.invocations().len();

        let rename = ToolUpdate {
            name: Some("   ".to_string()),
            description: None,
        };
        assert!(matches!(
            manager.update_tool("t2", rename).await,
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            manager.update_tool("t2", ToolUpdate::default()).await,
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            manager.set_session_tools("", ids(&["t1"]), None).await,
            Err(SyncError::Validation(_))
        ));
        assert_eq!(backend.invocations().len(), calls);
    }
}
