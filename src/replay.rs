//! Trace replay against the in-process backend
//!
//! A trace seeds the backend, then runs an ordered list of steps (intents,
//! push events, injected failures and concurrent backend writes) through a
//! `SyncEngine`. Step failures are recorded in the report, never fatal.

use crate::chat::{ChatMessage, ChatSession};
use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::gateway::{CompletionStatus, GatewayEvent, InMemoryBackend, MessageId, NewTool, SessionId, ToolId};
use crate::tools::{SessionToolAssignment, Tool};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read trace {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid trace: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Trace {
    /// Backend catalog seed
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub sessions: Vec<ChatSession>,
    /// Backend assignments present before the first step
    #[serde(default)]
    pub session_tools: HashMap<SessionId, Vec<ToolId>>,
    #[serde(default)]
    pub steps: Vec<TraceStep>,
}

/// One replay step. `message` fields accept either a label given to an
/// earlier `send` or a literal message id.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceStep {
    Send {
        session_id: SessionId,
        content: String,
        /// Names the assistant message; `<label>.user` names the user message
        #[serde(default)]
        label: Option<String>,
    },
    Token {
        message: String,
        token: String,
        #[serde(default)]
        cumulative_content: Option<String>,
    },
    Complete {
        message: String,
        #[serde(default)]
        error: Option<String>,
        /// Set both to deliver a message that completed on another client
        #[serde(default)]
        session_id: Option<SessionId>,
        #[serde(default)]
        content: Option<String>,
    },
    Cancel {
        message: String,
    },
    LoadCatalog,
    LoadSessionTools {
        session_id: SessionId,
    },
    SetSessionTools {
        session_id: SessionId,
        tool_ids: Vec<ToolId>,
        #[serde(default = "default_optimistic")]
        optimistic: bool,
    },
    InitSessionTools {
        session_id: SessionId,
    },
    ToggleEnabled {
        tool_id: ToolId,
        enabled: bool,
    },
    SetDefault {
        tool_id: ToolId,
        is_default: bool,
    },
    CreateTool {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
    DeleteTool {
        tool_id: ToolId,
    },
    /// Make the next invocation of a command fail
    FailNext {
        command: String,
    },
    /// Write an assignment directly to the backend, as another client would
    BackendSetSessionTools {
        session_id: SessionId,
        tool_ids: Vec<ToolId>,
    },
}

fn default_optimistic() -> bool {
    true
}

impl TraceStep {
    pub fn op(&self) -> &'static str {
        match self {
            TraceStep::Send { .. } => "send",
            TraceStep::Token { .. } => "token",
            TraceStep::Complete { .. } => "complete",
            TraceStep::Cancel { .. } => "cancel",
            TraceStep::LoadCatalog => "load_catalog",
            TraceStep::LoadSessionTools { .. } => "load_session_tools",
            TraceStep::SetSessionTools { .. } => "set_session_tools",
            TraceStep::InitSessionTools { .. } => "init_session_tools",
            TraceStep::ToggleEnabled { .. } => "toggle_enabled",
            TraceStep::SetDefault { .. } => "set_default",
            TraceStep::CreateTool { .. } => "create_tool",
            TraceStep::DeleteTool { .. } => "delete_tool",
            TraceStep::FailNext { .. } => "fail_next",
            TraceStep::BackendSetSessionTools { .. } => "backend_set_session_tools",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final engine state after a replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub messages: Vec<ChatMessage>,
    pub catalog_revision: u64,
    pub tools: Vec<Tool>,
    pub session_tools: Vec<SessionToolAssignment>,
    pub session_errors: BTreeMap<SessionId, String>,
    pub labels: BTreeMap<String, MessageId>,
    pub steps: Vec<StepOutcome>,
}

impl ReplayReport {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.error.is_some())
    }
}

pub fn load_trace(path: impl AsRef<Path>) -> Result<Trace, ReplayError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Run a trace from a fresh backend and engine
pub async fn replay(trace: Trace, config: SyncConfig) -> ReplayReport {
    let backend = InMemoryBackend::new(trace.tools);
    for (session_id, tool_ids) in trace.session_tools {
        backend.write_session_tools(&session_id, tool_ids);
    }

    let engine = SyncEngine::new(backend, config);
    if let Err(e) = engine.initialize().await {
        tracing::warn!(error = %e, "Initial catalog load failed");
    }

    let mut session_ids = Vec::with_capacity(trace.sessions.len());
    for session in trace.sessions {
        session_ids.push(session.id.clone());
        engine.chat().open_session(session);
    }

    let mut runner = Runner {
        engine: &engine,
        labels: BTreeMap::new(),
    };
    let mut steps = Vec::with_capacity(trace.steps.len());
    for (index, step) in trace.steps.into_iter().enumerate() {
        let op = step.op();
        let error = runner.run(step).await.err().map(|e| e.to_string());
        if let Some(error) = &error {
            tracing::info!(index, op, error = %error, "Replay step failed");
        }
        steps.push(StepOutcome { index, op, error });
    }

    let catalog = engine.tools().catalog();
    let mut session_tools = engine.tools().all_session_tools();
    session_tools.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    let session_errors = session_tools
        .iter()
        .map(|a| &a.session_id)
        .chain(session_ids.iter())
        .filter_map(|id| engine.tools().session_error(id).map(|e| (id.clone(), e)))
        .collect();

    ReplayReport {
        messages: engine.chat().all_messages(),
        catalog_revision: catalog.revision(),
        tools: catalog.tools().to_vec(),
        session_tools,
        session_errors,
        labels: runner.labels,
        steps,
    }
}

struct Runner<'a> {
    engine: &'a SyncEngine<InMemoryBackend>,
    labels: BTreeMap<String, MessageId>,
}

impl Runner<'_> {
    async fn run(&mut self, step: TraceStep) -> Result<(), SyncError> {
        let chat = self.engine.chat();
        let tools = self.engine.tools();
        match step {
            TraceStep::Send {
                session_id,
                content,
                label,
            } => {
                let sent = chat.send(&session_id, &content).await?;
                if let Some(label) = label {
                    self.labels.insert(format!("{label}.user"), sent.user_message_id);
                    self.labels.insert(label, sent.assistant_message_id);
                }
            }
            TraceStep::Token {
                message,
                token,
                cumulative_content,
            } => chat.handle_event(GatewayEvent::Token {
                message_id: self.resolve(&message),
                token,
                cumulative_content,
            })?,
            TraceStep::Complete {
                message,
                error,
                session_id,
                content,
            } => {
                let status = if error.is_some() {
                    CompletionStatus::Error
                } else {
                    CompletionStatus::Complete
                };
                chat.handle_event(GatewayEvent::Complete {
                    message_id: self.resolve(&message),
                    status,
                    error,
                    session_id,
                    content,
                })?;
            }
            TraceStep::Cancel { message } => chat.cancel(&self.resolve(&message)).await?,
            TraceStep::LoadCatalog => {
                tools.load_catalog().await?;
            }
            TraceStep::LoadSessionTools { session_id } => {
                tools.load_session_tools(&session_id).await?;
            }
            TraceStep::SetSessionTools {
                session_id,
                tool_ids,
                optimistic,
            } => {
                let catalog = tools.catalog();
                let snapshot = optimistic.then_some(&*catalog);
                tools.set_session_tools(&session_id, tool_ids, snapshot).await?;
            }
            TraceStep::InitSessionTools { session_id } => {
                tools.init_session_tools(&session_id).await?;
            }
            TraceStep::ToggleEnabled { tool_id, enabled } => {
                tools.toggle_enabled(&tool_id, enabled).await?;
            }
            TraceStep::SetDefault { tool_id, is_default } => {
                tools.set_default(&tool_id, is_default).await?;
            }
            TraceStep::CreateTool { name, description } => {
                tools.create_tool(NewTool { name, description }).await?;
            }
            TraceStep::DeleteTool { tool_id } => {
                tools.delete_tool(&tool_id).await?;
            }
            TraceStep::FailNext { command } => self.engine.gateway().fail_next(&command),
            TraceStep::BackendSetSessionTools { session_id, tool_ids } => {
                self.engine.gateway().write_session_tools(&session_id, tool_ids);
            }
        }
        Ok(())
    }

    fn resolve(&self, message: &str) -> MessageId {
        self.labels
            .get(message)
            .cloned()
            .unwrap_or_else(|| message.to_string())
    }
}
