//! Commands issued to the backend and the replies they produce

use super::{GatewayError, MessageId, RecordingId, SessionId, ToolId};
use crate::tools::Tool;
use serde::{Deserialize, Serialize};

/// Backend commands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ListTools,
    GetSessionTools {
        session_id: SessionId,
    },
    SetSessionTools {
        session_id: SessionId,
        tool_ids: Vec<ToolId>,
    },
    InitSessionTools {
        session_id: SessionId,
    },
    CreateTool {
        tool: NewTool,
    },
    UpdateTool {
        tool_id: ToolId,
        update: ToolUpdate,
    },
    DeleteTool {
        tool_id: ToolId,
    },
    SetToolDefault {
        tool_id: ToolId,
        is_default: bool,
    },
    SetToolEnabled {
        tool_id: ToolId,
        enabled: bool,
    },
    SendChat {
        recording_id: RecordingId,
        session_id: SessionId,
        /// Client-generated ids the backend should adopt
        user_message_id: MessageId,
        assistant_message_id: MessageId,
        content: String,
    },
    CancelChat {
        message_id: MessageId,
    },
}

impl Command {
    /// Conceptual command name, used in logs and for failure injection
    pub fn name(&self) -> &'static str {
        match self {
            Command::ListTools => "tools.list",
            Command::GetSessionTools { .. } => "tools.getForSession",
            Command::SetSessionTools { .. } => "tools.setForSession",
            Command::InitSessionTools { .. } => "tools.initForSession",
            Command::CreateTool { .. } => "tools.create",
            Command::UpdateTool { .. } => "tools.update",
            Command::DeleteTool { .. } => "tools.delete",
            Command::SetToolDefault { .. } => "tools.setDefault",
            Command::SetToolEnabled { .. } => "tools.setEnabled",
            Command::SendChat { .. } => "chat.send",
            Command::CancelChat { .. } => "chat.cancel",
        }
    }
}

/// Definition of a user-defined tool to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update of a tool's display metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ToolUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Command results
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack,
    Tools(Vec<Tool>),
    Tool(Tool),
    ToolIds(Vec<ToolId>),
    Sent {
        user_message_id: MessageId,
        assistant_message_id: MessageId,
    },
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Reply::Ack => "ack",
            Reply::Tools(_) => "tools",
            Reply::Tool(_) => "tool",
            Reply::ToolIds(_) => "tool_ids",
            Reply::Sent { .. } => "sent",
        }
    }

    pub fn into_ack(self, command: &'static str) -> Result<(), GatewayError> {
        match self {
            Reply::Ack => Ok(()),
            other => Err(GatewayError::unexpected_reply(command, other.kind())),
        }
    }

    pub fn into_tools(self, command: &'static str) -> Result<Vec<Tool>, GatewayError> {
        match self {
            Reply::Tools(tools) => Ok(tools),
            other => Err(GatewayError::unexpected_reply(command, other.kind())),
        }
    }

    pub fn into_tool(self, command: &'static str) -> Result<Tool, GatewayError> {
        match self {
            Reply::Tool(tool) => Ok(tool),
            other => Err(GatewayError::unexpected_reply(command, other.kind())),
        }
    }

    pub fn into_tool_ids(self, command: &'static str) -> Result<Vec<ToolId>, GatewayError> {
        match self {
            Reply::ToolIds(ids) => Ok(ids),
            other => Err(GatewayError::unexpected_reply(command, other.kind())),
        }
    }

    pub fn into_sent(self, command: &'static str) -> Result<(MessageId, MessageId), GatewayError> {
        match self {
            Reply::Sent {
                user_message_id,
                assistant_message_id,
            } => Ok((user_message_id, assistant_message_id)),
            other => Err(GatewayError::unexpected_reply(command, other.kind())),
        }
    }
}
