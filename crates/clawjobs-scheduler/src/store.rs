//! In-memory task and run store.
//! Same contract as the SQLite store, nothing survives the process.
//! Used for dry runs and as the store behind unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use clawjobs_core::error::{ClawJobsError, Result};
use clawjobs_core::traits::{RunStore, TaskStore};
use clawjobs_core::types::{RunId, RunRecord, Task, TaskId};

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<TaskId, Task>,
    runs: BTreeMap<RunId, RunRecord>,
    next_task_id: TaskId,
    next_run_id: RunId,
}

/// Volatile store. Ids start at 1 and are never reused.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskStore for MemoryStore {
    fn get_by_id(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.lock().tasks.get(&id).cloned())
    }

    fn insert(&self, task: &Task) -> Result<TaskId> {
        let mut inner = self.lock();
        inner.next_task_id += 1;
        let id = inner.next_task_id;
        let mut stored = task.clone();
        stored.id = Some(id);
        inner.tasks.insert(id, stored);
        Ok(id)
    }

    fn update(&self, task: &Task) -> Result<()> {
        let id = task
            .id
            .ok_or_else(|| ClawJobsError::Validation("task has no id".into()))?;
        let mut inner = self.lock();
        match inner.tasks.get_mut(&id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(ClawJobsError::TaskNotFound(id)),
        }
    }

    fn delete(&self, id: TaskId) -> Result<()> {
        self.lock().tasks.remove(&id);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Task>> {
        Ok(self.lock().tasks.values().cloned().collect())
    }
}

impl RunStore for MemoryStore {
    fn insert(&self, run: &RunRecord) -> Result<RunId> {
        let mut inner = self.lock();
        inner.next_run_id += 1;
        let id = inner.next_run_id;
        let mut stored = run.clone();
        stored.id = Some(id);
        inner.runs.insert(id, stored);
        Ok(id)
    }

    fn get_by_id(&self, id: RunId) -> Result<Option<RunRecord>> {
        Ok(self.lock().runs.get(&id).cloned())
    }

    fn list_all(&self) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self.lock().runs.values().cloned().collect();
        newest_first(&mut runs);
        Ok(runs)
    }

    fn list_for_task(&self, task_id: TaskId) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .lock()
            .runs
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect();
        newest_first(&mut runs);
        Ok(runs)
    }

    fn delete_by_id(&self, id: RunId) -> Result<()> {
        self.lock().runs.remove(&id);
        Ok(())
    }
}

fn newest_first(runs: &mut [RunRecord]) {
    runs.sort_by(|a, b| b.executed_at.cmp(&a.executed_at).then(b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use clawjobs_core::types::Schedule;

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let task = Task::new("a", "p", Schedule::Interval { hours: 1 });
        let first = TaskStore::insert(&store, &task).unwrap();
        let second = TaskStore::insert(&store, &task).unwrap();
        assert!(second > first);
        assert_eq!(
            TaskStore::get_by_id(&store, first).unwrap().unwrap().id,
            Some(first)
        );
    }

    #[test]
    fn test_update_missing_task_fails() {
        let store = MemoryStore::new();
        let mut task = Task::new("a", "p", Schedule::Interval { hours: 1 });
        task.id = Some(42);
        assert!(matches!(
            store.update(&task),
            Err(ClawJobsError::TaskNotFound(42))
        ));
    }

    #[test]
    fn test_runs_newest_first_and_survive_task_delete() {
        let store = MemoryStore::new();
        let mut task = Task::new("a", "p", Schedule::Interval { hours: 1 });
        let id = TaskStore::insert(&store, &task).unwrap();
        task.id = Some(id);

        let now = Utc::now();
        let old = RunStore::insert(&store, &RunRecord::success(&task, "old".into(), now - Duration::hours(1))).unwrap();
        let new = RunStore::insert(&store, &RunRecord::success(&task, "new".into(), now)).unwrap();

        store.delete(id).unwrap();
        let runs = store.list_for_task(id).unwrap();
        assert_eq!(runs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![Some(new), Some(old)]);
        assert_eq!(store.latest_for_task(id).unwrap().unwrap().response_text, "new");
    }
}
