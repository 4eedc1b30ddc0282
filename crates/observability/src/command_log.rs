//! Writes every command lifecycle event to the log as JSON.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use quire_commands::{CommandEvent, CommandService};

/// Spawn a task that logs the service's lifecycle events until every handle
/// to the service is dropped.
pub fn spawn_command_log(service: &CommandService) -> JoinHandle<()> {
    let events = service.subscribe();
    tokio::spawn(forward(events))
}

async fn forward(mut events: broadcast::Receiver<CommandEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(
                command_id = %event.command_id,
                command = event.command,
                event = %event.to_json(),
                "command activity"
            ),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "command log fell behind; events dropped")
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use quire_commands::{Command, CommandHeader, Outcome};

    use super::*;

    struct Touch {
        header: CommandHeader,
    }

    #[async_trait]
    impl Command for Touch {
        fn header(&self) -> &CommandHeader {
            &self.header
        }

        async fn execute(&mut self) -> Outcome {
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_task_ends_with_the_service() {
        let service = CommandService::default();
        let log = spawn_command_log(&service);

        service
            .execute_and_wait(Touch {
                header: CommandHeader::undoable(),
            })
            .await
            .unwrap();
        drop(service);

        tokio::time::timeout(Duration::from_secs(5), log)
            .await
            .expect("command log should stop once the service is gone")
            .unwrap();
    }
}
