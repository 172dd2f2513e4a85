//! Tool resolution and per-session assignment
//!
//! The catalog is a single snapshot reloaded wholesale from the backend; the
//! builtin/custom/mcp/default/enabled views are projections of it. Session
//! assignments are written optimistically and reconciled by reloading.

mod assignment;
mod catalog;
mod manager;

#[cfg(test)]
mod proptests;

pub use assignment::{Confirmation, SessionToolAssignment};
pub use catalog::{McpServerTools, Tool, ToolCatalog, ToolKind};
pub use manager::ToolManager;
