//! Command lifecycle notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use quire_core::{CommandId, ExecutionSource};

/// How a command is being run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Execute,
    Undo,
    Redo,
    Immediate,
}

/// Where in its run a command is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    Started,
    Succeeded,
    Failed,
}

/// Broadcast to subscribers of [`CommandService::subscribe`](crate::CommandService::subscribe).
#[derive(Debug, Clone, Serialize)]
pub struct CommandEvent {
    pub command_id: CommandId,
    pub command: &'static str,
    pub mode: ExecutionMode,
    pub phase: EventPhase,
    pub source: ExecutionSource,
    pub at: DateTime<Utc>,
}

impl CommandEvent {
    pub(crate) fn new(
        command_id: CommandId,
        command: &'static str,
        mode: ExecutionMode,
        phase: EventPhase,
        source: ExecutionSource,
    ) -> Self {
        Self {
            command_id,
            command,
            mode,
            phase,
            source,
            at: Utc::now(),
        }
    }

    pub(crate) fn finished(&self, succeeded: bool) -> Self {
        let phase = if succeeded {
            EventPhase::Succeeded
        } else {
            EventPhase::Failed
        };
        Self::new(self.command_id, self.command, self.mode, phase, self.source)
    }

    /// JSON rendering for log lines.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_snake_case_tags() {
        let event = CommandEvent::new(
            CommandId::new(),
            "rename",
            ExecutionMode::Undo,
            EventPhase::Started,
            ExecutionSource::new("editor.rs", 10),
        );
        let json = event.to_json();

        assert_eq!(json["mode"], "undo");
        assert_eq!(json["phase"], "started");
        assert_eq!(json["command"], "rename");
        assert_eq!(json["source"]["line"], 10);
    }

    #[test]
    fn finished_keeps_identity() {
        let started = CommandEvent::new(
            CommandId::new(),
            "rename",
            ExecutionMode::Execute,
            EventPhase::Started,
            ExecutionSource::new("editor.rs", 10),
        );
        let done = started.finished(false);

        assert_eq!(done.command_id, started.command_id);
        assert_eq!(done.phase, EventPhase::Failed);
    }
}
