//! `quire-tasks`: background task groups.
//!
//! Tasks carry no undo semantics and never go through the command queue. A
//! [`TaskScheduler`] drains submitted [`TaskGroup`]s one at a time: serial
//! groups run their tasks in order and stop at the first failure, parallel
//! groups fan out and report each task independently.

pub mod group;
pub mod scheduler;
pub mod task;

pub use group::{GroupKind, GroupReport, TaskGroup, TaskProgress, TaskStatus};
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerStats, TaskGroupHandle, TaskScheduler};
pub use task::{FnTask, Task, TaskError, task_fn};

pub use tokio_util::sync::CancellationToken;
