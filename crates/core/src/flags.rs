//! Command capability tags.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A single capability a command declares.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandFlag {
    /// Successful execution is recorded on the undo stack.
    Undoable,
    /// The resource tree must be refreshed after the command runs.
    TriggersResourceRefresh,
    /// Workspace state must be saved after the command runs.
    TriggersStateSave,
}

impl CommandFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandFlag::Undoable => "undoable",
            CommandFlag::TriggersResourceRefresh => "triggers_resource_refresh",
            CommandFlag::TriggersStateSave => "triggers_state_save",
        }
    }
}

/// Set of capability tags carried by a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandFlags(BTreeSet<CommandFlag>);

impl CommandFlags {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Shorthand for the most common case.
    pub fn undoable() -> Self {
        Self::empty().with(CommandFlag::Undoable)
    }

    pub fn with(mut self, flag: CommandFlag) -> Self {
        self.0.insert(flag);
        self
    }

    pub fn insert(&mut self, flag: CommandFlag) -> bool {
        self.0.insert(flag)
    }

    pub fn remove(&mut self, flag: CommandFlag) -> bool {
        self.0.remove(&flag)
    }

    pub fn contains(&self, flag: CommandFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CommandFlag> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<CommandFlag> for CommandFlags {
    fn from_iter<I: IntoIterator<Item = CommandFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<CommandFlag> for CommandFlags {
    fn extend<I: IntoIterator<Item = CommandFlag>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<const N: usize> From<[CommandFlag; N]> for CommandFlags {
    fn from(flags: [CommandFlag; N]) -> Self {
        flags.into_iter().collect()
    }
}

impl core::fmt::Display for CommandFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let names: Vec<&str> = self.iter().map(|flag| flag.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
