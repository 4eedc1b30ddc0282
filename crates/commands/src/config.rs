//! Command service configuration.

use std::time::Duration;

/// Configuration for a [`CommandService`](crate::CommandService).
#[derive(Debug, Clone)]
pub struct CommandServiceConfig {
    /// Name for logging.
    pub name: String,
    /// Minimum time between `flush_pending_saves` hook calls.
    pub flush_interval: Duration,
    /// Lifecycle events buffered per subscriber before old ones are dropped.
    pub event_capacity: usize,
}

impl Default for CommandServiceConfig {
    fn default() -> Self {
        Self {
            name: "command-executor".to_string(),
            flush_interval: Duration::from_millis(200),
            event_capacity: 256,
        }
    }
}

impl CommandServiceConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
