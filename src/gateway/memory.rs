//! In-process reference backend
//!
//! Implements the command side of the contract over plain in-memory tables.
//! Used by the replay tool and by tests; it also supports one-shot failure
//! injection and direct writes that stand in for a concurrent client.

use super::{Command, Gateway, GatewayError, MessageId, NewTool, Reply, SessionId, ToolId, ToolUpdate};
use crate::tools::{Tool, ToolKind};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct BackendState {
    tools: Vec<Tool>,
    session_tools: HashMap<SessionId, Vec<ToolId>>,
    /// Accepted `chat.send` calls: (session, user message, assistant message)
    sent: Vec<(SessionId, MessageId, MessageId)>,
    cancelled: HashSet<MessageId>,
    /// Pending one-shot failures by command name
    failures: HashMap<String, usize>,
    invocations: Vec<&'static str>,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<BackendState>,
}

impl InMemoryBackend {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self {
            state: Mutex::new(BackendState {
                tools,
                ..BackendState::default()
            }),
        }
    }

    /// Make the next invocation of `command` fail with a transport error
    pub fn fail_next(&self, command: &str) {
        *self.lock().failures.entry(command.to_string()).or_default() += 1;
    }

    /// Overwrite a session's tools directly, as another client would
    pub fn write_session_tools(&self, session_id: &str, tool_ids: Vec<ToolId>) {
        self.lock().session_tools.insert(session_id.to_string(), tool_ids);
    }

    pub fn session_tools(&self, session_id: &str) -> Vec<ToolId> {
        self.lock().session_tools.get(session_id).cloned().unwrap_or_default()
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.lock().tools.clone()
    }

    /// Names of all commands received so far, in order
    pub fn invocations(&self) -> Vec<&'static str> {
        self.lock().invocations.clone()
    }

    pub fn sent_messages(&self) -> Vec<(SessionId, MessageId, MessageId)> {
        self.lock().sent.clone()
    }

    pub fn is_cancelled(&self, message_id: &str) -> bool {
        self.lock().cancelled.contains(message_id)
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Gateway for InMemoryBackend {
    async fn invoke(&self, command: Command) -> Result<Reply, GatewayError> {
        let mut state = self.lock();
        let name = command.name();
        state.invocations.push(name);

        if let Some(remaining) = state.failures.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::transport(name, "injected failure"));
            }
        }

        state.execute(command)
    }
}

impl BackendState {
    fn execute(&mut self, command: Command) -> Result<Reply, GatewayError> {
        let name = command.name();
        match command {
            Command::ListTools => Ok(Reply::Tools(self.tools.clone())),
            Command::GetSessionTools { session_id } => Ok(Reply::ToolIds(
                self.session_tools.get(&session_id).cloned().unwrap_or_default(),
            )),
            Command::SetSessionTools { session_id, tool_ids } => {
                if let Some(unknown) = tool_ids.iter().find(|id| self.tool(id).is_none()) {
                    return Err(GatewayError::rejected(name, format!("unknown tool {unknown}")));
                }
                self.session_tools.insert(session_id, tool_ids);
                Ok(Reply::Ack)
            }
            Command::InitSessionTools { session_id } => {
                let defaults = self
                    .tools
                    .iter()
                    .filter(|t| t.enabled && t.is_default)
                    .map(|t| t.id.clone())
                    .collect();
                self.session_tools.insert(session_id, defaults);
                Ok(Reply::Ack)
            }
            Command::CreateTool { tool } => Ok(Reply::Tool(self.create_tool(tool))),
            Command::UpdateTool { tool_id, update } => {
                self.update_tool(name, &tool_id, update)?;
                Ok(Reply::Ack)
            }
            Command::DeleteTool { tool_id } => {
                let before = self.tools.len();
                self.tools.retain(|t| t.id != tool_id);
                if self.tools.len() == before {
                    return Err(GatewayError::rejected(name, format!("unknown tool {tool_id}")));
                }
                for ids in self.session_tools.values_mut() {
                    ids.retain(|id| *id != tool_id);
                }
                Ok(Reply::Ack)
            }
            Command::SetToolDefault { tool_id, is_default } => {
                self.tool_mut(name, &tool_id)?.is_default = is_default;
                Ok(Reply::Ack)
            }
            Command::SetToolEnabled { tool_id, enabled } => {
                self.tool_mut(name, &tool_id)?.enabled = enabled;
                Ok(Reply::Ack)
            }
            Command::SendChat {
                session_id,
                user_message_id,
                assistant_message_id,
                ..
            } => {
                self.sent
                    .push((session_id, user_message_id.clone(), assistant_message_id.clone()));
                Ok(Reply::Sent {
                    user_message_id,
                    assistant_message_id,
                })
            }
            Command::CancelChat { message_id } => {
                self.cancelled.insert(message_id);
                Ok(Reply::Ack)
            }
        }
    }

    fn create_tool(&mut self, tool: NewTool) -> Tool {
        let created = Tool {
            id: uuid::Uuid::new_v4().to_string(),
            name: tool.name,
            description: tool.description,
            kind: ToolKind::Custom,
            enabled: true,
            is_default: false,
        };
        self.tools.push(created.clone());
        created
    }

    fn update_tool(&mut self, command: &'static str, tool_id: &str, update: ToolUpdate) -> Result<(), GatewayError> {
        let tool = self.tool_mut(command, tool_id)?;
        if let Some(name) = update.name {
            tool.name = name;
        }
        if let Some(description) = update.description {
            tool.description = Some(description);
        }
        Ok(())
    }

    fn tool(&self, id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id == id)
    }

    fn tool_mut(&mut self, command: &'static str, id: &str) -> Result<&mut Tool, GatewayError> {
        self.tools
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| GatewayError::rejected(command, format!("unknown tool {id}")))
    }
}
