//! Per-session tool selection state

use crate::gateway::{SessionId, ToolId};
use serde::Serialize;
use std::collections::HashMap;

/// Whether the local assignment is known to match the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// Loaded from, or acknowledged by, the backend
    Confirmed,
    /// Applied optimistically; the backend has not answered yet
    Tentative,
}

/// Tools selected for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionToolAssignment {
    pub session_id: SessionId,
    pub tool_ids: Vec<ToolId>,
    pub confirmation: Confirmation,
}

impl SessionToolAssignment {
    pub fn is_confirmed(&self) -> bool {
        self.confirmation == Confirmation::Confirmed
    }
}

/// Where the current value of a slot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// An optimistic local write
    LocalWrite,
    /// A backend load, a reconciliation reload or a non-optimistic write
    Backend,
}

#[derive(Debug)]
struct Slot {
    assignment: SessionToolAssignment,
    /// Bumped by every local replacement; an acknowledgement only confirms the
    /// write that produced the current generation.
    generation: u64,
    origin: Origin,
}

/// What an acknowledged optimistic write found when it came back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acknowledgement {
    /// Still the current value; now confirmed
    Confirmed,
    /// A newer optimistic write replaced it and will settle on its own
    SupersededByWrite,
    /// A backend load replaced it. The load may predate this write reaching
    /// the backend, so the local value can be stale.
    SupersededByReload,
}

/// All session assignments plus the session-scoped error indicators
#[derive(Debug, Default)]
pub(crate) struct AssignmentTable {
    slots: HashMap<SessionId, Slot>,
    errors: HashMap<SessionId, String>,
}

impl AssignmentTable {
    pub fn get(&self, session_id: &str) -> Option<&SessionToolAssignment> {
        self.slots.get(session_id).map(|slot| &slot.assignment)
    }

    pub fn all(&self) -> impl Iterator<Item = &SessionToolAssignment> {
        self.slots.values().map(|slot| &slot.assignment)
    }

    /// Apply an optimistic write and return its generation
    pub fn apply_tentative(&mut self, session_id: &str, tool_ids: Vec<ToolId>) -> u64 {
        self.replace(session_id, tool_ids, Confirmation::Tentative, Origin::LocalWrite)
    }

    /// Replace wholesale with backend-authoritative state
    pub fn replace_confirmed(&mut self, session_id: &str, tool_ids: Vec<ToolId>) -> u64 {
        self.replace(session_id, tool_ids, Confirmation::Confirmed, Origin::Backend)
    }

    /// Settle the optimistic write that produced `generation` after the
    /// backend accepted it
    pub fn acknowledge(&mut self, session_id: &str, generation: u64) -> Acknowledgement {
        match self.slots.get_mut(session_id) {
            Some(slot) if slot.generation == generation => {
                slot.assignment.confirmation = Confirmation::Confirmed;
                Acknowledgement::Confirmed
            }
            Some(slot) if slot.origin == Origin::LocalWrite => Acknowledgement::SupersededByWrite,
            _ => Acknowledgement::SupersededByReload,
        }
    }

    pub fn error(&self, session_id: &str) -> Option<&str> {
        self.errors.get(session_id).map(String::as_str)
    }

    pub fn set_error(&mut self, session_id: &str, message: String) {
        self.errors.insert(session_id.to_string(), message);
    }

    pub fn clear_error(&mut self, session_id: &str) {
        self.errors.remove(session_id);
    }

    fn replace(
        &mut self,
        session_id: &str,
        tool_ids: Vec<ToolId>,
        confirmation: Confirmation,
        origin: Origin,
    ) -> u64 {
        let assignment = SessionToolAssignment {
            session_id: session_id.to_string(),
            tool_ids,
            confirmation,
        };
        let slot = self
            .slots
            .entry(session_id.to_string())
            .or_insert_with(|| Slot {
                assignment: assignment.clone(),
                generation: 0,
                origin,
            });
        slot.assignment = assignment;
        slot.origin = origin;
        slot.generation += 1;
        slot.generation
    }
}
