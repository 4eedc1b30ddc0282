//! Undo and redo history.
//!
//! History is kept as two stacks of [`UndoGroup`]s. A group holds one or more
//! executed commands in execution order. Commands that share an
//! [`UndoGroupId`] land in the same group and are undone and redone together,
//! even when other work ran between them. A group sits at the position of its
//! newest member.
//!
//! This type only stores groups. Running `undo`/`redo` on the members happens
//! on the executor (see [`CommandService::undo`](crate::CommandService::undo))
//! so history changes never interleave with command execution.

use serde::Serialize;

use quire_core::{CommandId, ExecutionSource, UndoGroupId};

use crate::command::Command;

/// Which history direction an operation moves a group in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOperation {
    Undo,
    Redo,
}

impl core::fmt::Display for HistoryOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HistoryOperation::Undo => f.write_str("undo"),
            HistoryOperation::Redo => f.write_str("redo"),
        }
    }
}

/// Identity of a group for logging: its undo group id, or the id of its only
/// command for ungrouped commands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Group(UndoGroupId),
    Single(CommandId),
}

impl core::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            GroupKey::Group(id) => write!(f, "group:{id}"),
            GroupKey::Single(id) => write!(f, "command:{id}"),
        }
    }
}

/// A command that has executed, with the call site that submitted it.
pub(crate) struct ExecutedCommand {
    pub command: Box<dyn Command>,
    pub source: ExecutionSource,
}

impl ExecutedCommand {
    pub fn id(&self) -> CommandId {
        self.command.header().id()
    }
}

/// One entry on the undo or redo stack. Never empty.
pub(crate) struct UndoGroup {
    id: Option<UndoGroupId>,
    members: Vec<ExecutedCommand>,
}

impl UndoGroup {
    fn single(executed: ExecutedCommand) -> Self {
        Self {
            id: executed.command.header().undo_group(),
            members: vec![executed],
        }
    }

    /// Rebuild a group from members in execution order.
    ///
    /// Returns `None` if every member was lost (a member that panics is dropped).
    pub fn from_members(id: Option<UndoGroupId>, members: Vec<ExecutedCommand>) -> Option<Self> {
        if members.is_empty() {
            None
        } else {
            Some(Self { id, members })
        }
    }

    pub fn id(&self) -> Option<UndoGroupId> {
        self.id
    }

    pub fn key(&self) -> GroupKey {
        match (self.id, self.members.first()) {
            (Some(group), _) => GroupKey::Group(group),
            (None, Some(first)) => GroupKey::Single(first.id()),
            // Groups are constructed non-empty; a fresh id keeps logging total.
            (None, None) => GroupKey::Single(CommandId::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[cfg(test)]
    pub fn command_ids(&self) -> Vec<CommandId> {
        self.members.iter().map(ExecutedCommand::id).collect()
    }

    /// Members in execution order.
    pub fn into_members(self) -> Vec<ExecutedCommand> {
        self.members
    }
}

/// Undo and redo stacks.
#[derive(Default)]
pub(crate) struct UndoManager {
    undo: Vec<UndoGroup>,
    redo: Vec<UndoGroup>,
}

impl UndoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    /// Record a freshly executed command.
    ///
    /// If a group with the same undo group id is already on the undo stack,
    /// the command joins it and the group moves to the top; otherwise it
    /// starts a new group. The redo stack is cleared, and the evicted commands
    /// are returned so the caller can drop them outside any lock.
    pub fn record(&mut self, executed: ExecutedCommand) -> Vec<UndoGroup> {
        let group_id = executed.command.header().undo_group();
        let existing = group_id.and_then(|id| {
            self.undo
                .iter()
                .rposition(|group| group.id == Some(id))
                .map(|index| self.undo.remove(index))
        });
        match existing {
            Some(mut group) => {
                group.members.push(executed);
                self.undo.push(group);
            }
            None => self.undo.push(UndoGroup::single(executed)),
        }
        std::mem::take(&mut self.redo)
    }

    pub fn pop_undo(&mut self) -> Option<UndoGroup> {
        self.undo.pop()
    }

    pub fn pop_redo(&mut self) -> Option<UndoGroup> {
        self.redo.pop()
    }

    /// Push a group that was just undone.
    pub fn push_redo(&mut self, group: UndoGroup) {
        self.redo.push(group);
    }

    /// Push a group that was just redone. Unlike [`record`](Self::record) this
    /// keeps the rest of the redo stack.
    pub fn push_undo(&mut self, group: UndoGroup) {
        self.undo.push(group);
    }

    /// Drop all history, returning it for out-of-lock disposal.
    pub fn clear(&mut self) -> (Vec<UndoGroup>, Vec<UndoGroup>) {
        (std::mem::take(&mut self.undo), std::mem::take(&mut self.redo))
    }
}
