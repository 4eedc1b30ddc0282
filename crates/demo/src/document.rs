//! A tiny in-memory text document edited through undoable commands.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use quire_commands::{
    Command, CommandFlag, CommandHeader, CommandRegistry, ExecutionHooks, Failure, Outcome,
    UndoGroupId,
};

/// Shared document state.
#[derive(Clone, Default)]
pub struct Document {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Document {
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().clone()
    }
}

/// Append a line at the end of the document.
pub struct AppendLine {
    header: CommandHeader,
    pub text: String,
    document: Document,
}

impl AppendLine {
    pub fn set_undo_group(&mut self, group: UndoGroupId) {
        self.header.set_undo_group(Some(group));
    }
}

#[async_trait]
impl Command for AppendLine {
    fn header(&self) -> &CommandHeader {
        &self.header
    }

    fn name(&self) -> &'static str {
        "document.append_line"
    }

    async fn execute(&mut self) -> Outcome {
        // Stand-in for a write to disk.
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.document.lock().push(self.text.clone());
        Ok(())
    }

    async fn undo(&mut self) -> Outcome {
        let mut lines = self.document.lock();
        if lines.last() != Some(&self.text) {
            return Err(Failure::new(format!("last line is not '{}'", self.text)));
        }
        lines.pop();
        Ok(())
    }
}

/// Replace the line at `index`.
pub struct ReplaceLine {
    header: CommandHeader,
    pub index: usize,
    pub text: String,
    previous: Option<String>,
    document: Document,
}

#[async_trait]
impl Command for ReplaceLine {
    fn header(&self) -> &CommandHeader {
        &self.header
    }

    fn name(&self) -> &'static str {
        "document.replace_line"
    }

    async fn execute(&mut self) -> Outcome {
        let mut lines = self.document.lock();
        let line = lines
            .get_mut(self.index)
            .ok_or_else(|| Failure::new(format!("no line {}", self.index)))?;
        self.previous = Some(std::mem::replace(line, self.text.clone()));
        Ok(())
    }

    async fn undo(&mut self) -> Outcome {
        let previous = self
            .previous
            .take()
            .ok_or_else(|| Failure::new("nothing to restore"))?;
        let mut lines = self.document.lock();
        let line = lines
            .get_mut(self.index)
            .ok_or_else(|| Failure::new(format!("no line {}", self.index)))?;
        *line = previous;
        Ok(())
    }
}

/// Register the document commands, each bound to `document`.
pub fn register(registry: &mut CommandRegistry, document: &Document) {
    let doc = document.clone();
    registry.register("document.append_line", move || AppendLine {
        header: CommandHeader::undoable().with_flag(CommandFlag::TriggersStateSave),
        text: String::new(),
        document: doc.clone(),
    });

    let doc = document.clone();
    registry.register("document.replace_line", move || ReplaceLine {
        header: CommandHeader::undoable()
            .with_flag(CommandFlag::TriggersResourceRefresh)
            .with_flag(CommandFlag::TriggersStateSave),
        index: 0,
        text: String::new(),
        previous: None,
        document: doc.clone(),
    });
}

/// Hooks that report what a host application would do.
pub struct LoggingHooks {
    pub document: Document,
}

#[async_trait]
impl ExecutionHooks for LoggingHooks {
    async fn refresh_resources(&self) -> Outcome {
        info!(lines = self.document.lines().len(), "refreshing resources");
        Ok(())
    }

    async fn save_state(&self) -> Outcome {
        info!("saving workspace state");
        Ok(())
    }

    async fn flush_pending_saves(&self, elapsed: Duration) -> Outcome {
        info!(elapsed_ms = elapsed.as_millis() as u64, "flushing pending saves");
        Ok(())
    }
}
