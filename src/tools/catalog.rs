//! Tool catalog snapshot and its derived views

use crate::gateway::ToolId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Origin of a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolKind {
    /// Shipped with the application
    Builtin,
    /// Defined by the user
    Custom,
    /// Provided by an MCP server. `server_id` is a relation, not ownership;
    /// `server_name` is denormalized for display.
    Mcp {
        server_id: String,
        server_name: String,
    },
}

impl ToolKind {
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Builtin => "builtin",
            ToolKind::Custom => "custom",
            ToolKind::Mcp { .. } => "mcp",
        }
    }
}

/// A callable capability exposable for function calling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: ToolKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub is_default: bool,
}

fn default_enabled() -> bool {
    true
}

impl Tool {
    pub fn builtin(id: impl Into<ToolId>, name: impl Into<String>) -> Self {
        Self::with_kind(id, name, ToolKind::Builtin)
    }

    pub fn custom(id: impl Into<ToolId>, name: impl Into<String>) -> Self {
        Self::with_kind(id, name, ToolKind::Custom)
    }

    pub fn mcp(
        id: impl Into<ToolId>,
        name: impl Into<String>,
        server_id: impl Into<String>,
        server_name: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            id,
            name,
            ToolKind::Mcp {
                server_id: server_id.into(),
                server_name: server_name.into(),
            },
        )
    }

    fn with_kind(id: impl Into<ToolId>, name: impl Into<String>, kind: ToolKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            kind,
            enabled: true,
            is_default: false,
        }
    }

    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Tools served by one MCP server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpServerTools<'a> {
    pub server_name: &'a str,
    pub tools: Vec<&'a Tool>,
}

/// Immutable snapshot of the tool catalog.
///
/// `revision` identifies the snapshot; every wholesale reload produces a new
/// one. The views below are projections of `tools` and are recomputed on each
/// call rather than cached next to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolCatalog {
    revision: u64,
    tools: Vec<Tool>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self::with_revision(0, tools)
    }

    pub(crate) fn with_revision(revision: u64, tools: Vec<Tool>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(tools.len());
        for tool in tools {
            if seen.insert(tool.id.clone()) {
                unique.push(tool);
            } else {
                tracing::warn!(tool_id = %tool.id, "Duplicate tool id in catalog, keeping first");
            }
        }
        Self {
            revision,
            tools: unique,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn builtin_tools(&self) -> Vec<&Tool> {
        self.filter(|t| matches!(t.kind, ToolKind::Builtin))
    }

    pub fn custom_tools(&self) -> Vec<&Tool> {
        self.filter(|t| matches!(t.kind, ToolKind::Custom))
    }

    pub fn mcp_tools(&self) -> Vec<&Tool> {
        self.filter(|t| matches!(t.kind, ToolKind::Mcp { .. }))
    }

    pub fn enabled_tools(&self) -> Vec<&Tool> {
        self.filter(|t| t.enabled)
    }

    /// Default tools. A disabled tool is never part of this view, even when
    /// its default flag is set.
    pub fn default_tools(&self) -> Vec<&Tool> {
        self.filter(|t| t.enabled && t.is_default)
    }

    /// MCP tools grouped by owning server id
    pub fn mcp_servers(&self) -> BTreeMap<&str, McpServerTools<'_>> {
        let mut servers: BTreeMap<&str, McpServerTools<'_>> = BTreeMap::new();
        for tool in &self.tools {
            if let ToolKind::Mcp {
                server_id,
                server_name,
            } = &tool.kind
            {
                servers
                    .entry(server_id.as_str())
                    .or_insert_with(|| McpServerTools {
                        server_name,
                        tools: Vec::new(),
                    })
                    .tools
                    .push(tool);
            }
        }
        servers
    }

    /// Normalize a requested selection against this snapshot: request order is
    /// kept and duplicates are dropped. With `prune_unknown`, ids missing from
    /// the catalog are dropped as well.
    pub fn resolve(&self, ids: &[ToolId], prune_unknown: bool) -> Vec<ToolId> {
        let known = ids.iter().filter(|id| {
            if prune_unknown && !self.contains(id) {
                tracing::debug!(tool_id = %id, revision = self.revision, "Dropping unknown tool id");
                return false;
            }
            true
        });
        unique_ids(known.cloned())
    }

    fn filter(&self, pred: impl Fn(&Tool) -> bool) -> Vec<&Tool> {
        self.tools.iter().filter(|t| pred(t)).collect()
    }
}

/// Drop repeated ids, keeping the first occurrence of each in order
pub(crate) fn unique_ids(ids: impl IntoIterator<Item = ToolId>) -> Vec<ToolId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
