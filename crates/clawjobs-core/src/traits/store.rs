//! Task and run store traits.

use crate::error::Result;
use crate::types::{RunId, RunRecord, Task, TaskId};

/// Durable task definitions.
pub trait TaskStore: Send + Sync {
    fn get_by_id(&self, id: TaskId) -> Result<Option<Task>>;

    /// Insert a new task and return its id. `task.id` is ignored.
    fn insert(&self, task: &Task) -> Result<TaskId>;

    fn update(&self, task: &Task) -> Result<()>;

    fn delete(&self, id: TaskId) -> Result<()>;

    /// All tasks, oldest first.
    fn list_all(&self) -> Result<Vec<Task>>;
}

/// Append-only run history.
pub trait RunStore: Send + Sync {
    fn insert(&self, run: &RunRecord) -> Result<RunId>;

    fn get_by_id(&self, id: RunId) -> Result<Option<RunRecord>>;

    /// All runs, newest first.
    fn list_all(&self) -> Result<Vec<RunRecord>>;

    /// Runs of one task, newest first.
    fn list_for_task(&self, task_id: TaskId) -> Result<Vec<RunRecord>>;

    fn latest_for_task(&self, task_id: TaskId) -> Result<Option<RunRecord>> {
        Ok(self.list_for_task(task_id)?.into_iter().next())
    }

    fn delete_by_id(&self, id: RunId) -> Result<()>;
}
