//! Walks through the command engine and the task scheduler end to end.

mod document;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use quire_commands::{CommandRegistry, CommandService, CommandServiceConfig, UndoGroupId};
use quire_core::Failure;
use quire_tasks::{CancellationToken, SchedulerConfig, TaskError, TaskScheduler, task_fn};

use document::{AppendLine, Document, LoggingHooks, ReplaceLine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quire_observability::init_with_format(quire_observability::LogFormat::Pretty);

    let document = Document::default();
    let mut registry = CommandRegistry::new();
    document::register(&mut registry, &document);

    let service = CommandService::builder()
        .config(CommandServiceConfig::default().with_name("demo-executor"))
        .registry(registry)
        .hooks(Arc::new(LoggingHooks {
            document: document.clone(),
        }))
        .build();
    let command_log = quire_observability::spawn_command_log(&service);

    // Two lines typed as one edit: undone and redone together.
    let paste = UndoGroupId::new();
    for text in ["hello", "world"] {
        service.execute::<AppendLine>("document.append_line", |c| {
            c.text = text.into();
            c.set_undo_group(paste);
        })?;
    }
    service.execute::<ReplaceLine>("document.replace_line", |c| {
        c.index = 0;
        c.text = "goodbye".into();
    })?;

    // Wait for the queue to catch up.
    service.try_undo().await?;
    info!(lines = ?document.lines(), "after undoing the replace");

    service.undo().await.context("undo paste")?;
    info!(lines = ?document.lines(), "after undoing the paste");

    service.redo().await.context("redo paste")?;
    info!(
        lines = ?document.lines(),
        undo = service.undo_count(),
        redo = service.redo_count(),
        "after redoing the paste"
    );

    // Background work never touches the undo history.
    let scheduler = TaskScheduler::spawn(SchedulerConfig::default().with_name("demo-scheduler"));
    let snapshot = document.lines();
    let mut handle = scheduler.schedule_parallel_tasks(vec![
        Box::new(task_fn("count-words", move |_| async move {
            let words: usize = snapshot.iter().map(|l| l.split_whitespace().count()).sum();
            info!(words, "counted words");
            Ok(())
        })),
        Box::new(task_fn("spell-check", |cancel: CancellationToken| async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(TaskError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(20)) => {
                    Err(TaskError::Failed(Failure::new("dictionary not installed")))
                }
            }
        })),
    ])?;
    while let Some(progress) = handle.progress().await {
        info!(task = progress.name, status = ?progress.status, "task progress");
    }
    let report = handle.wait().await?;
    info!(report = %serde_json::to_string(&report)?, "task group finished");

    scheduler.shutdown().await;
    let discarded = service.stop().await;
    info!(discarded, stats = %serde_json::to_string(&service.stats())?, "command executor stopped");

    drop(service);
    let _ = command_log.await;
    Ok(())
}
