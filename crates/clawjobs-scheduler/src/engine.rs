//! Scheduler Engine — keeps timers in step with stored tasks and feeds
//! fired jobs to the executor.
//!
//! Every mutation (save, delete, enable/disable, restore, reconcile) runs
//! under one async lock and cancels a task's timer before re-arming it, so
//! a job name never has two live timers.
//!
//! Other processes (one-shot CLI commands) edit the same store. `serve`
//! calls [`SchedulerEngine::reconcile`] on a fixed tick to pick their
//! changes up.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use clawjobs_core::error::{ClawJobsError, Result};
use clawjobs_core::traits::TaskStore;
use clawjobs_core::types::{Schedule, Task, TaskId};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::executor::JobExecutor;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::tasks;
use crate::timer::{JobRequest, TimerService, Trigger};

/// Arms and cancels timers for individual tasks.
pub struct Scheduler {
    timers: Arc<dyn TimerService>,
}

impl Scheduler {
    pub fn new(timers: Arc<dyn TimerService>) -> Self {
        Self { timers }
    }

    /// Arm the task's timer relative to the local wall clock.
    /// Disabled tasks are left alone. Returns whether a timer was armed.
    pub fn schedule(&self, task: &Task) -> bool {
        self.schedule_at(task, &Local::now())
    }

    pub fn schedule_at<Tz: TimeZone>(&self, task: &Task, now: &DateTime<Tz>) -> bool {
        let Some(task_id) = task.id else {
            tracing::warn!("⚠️ Task '{}' has no id, not scheduling", task.name);
            return false;
        };
        if task.job_name.is_empty() {
            tracing::warn!("⚠️ Task '{}' has no job name, not scheduling", task.name);
            return false;
        }
        let Some(plan) = tasks::plan(task, now) else {
            return false;
        };
        tracing::info!(
            "📅 Scheduled '{}' as {} ({})",
            task.name,
            task.job_name,
            task.schedule
        );
        self.timers.arm(&task.job_name, task_id, plan);
        true
    }

    /// Cancel whatever timer is registered under `job_name`.
    pub fn cancel(&self, job_name: &str) {
        if self.timers.cancel(job_name) {
            tracing::info!("🛑 Cancelled timer {}", job_name);
        }
    }

    pub fn armed(&self) -> Vec<String> {
        self.timers.armed()
    }
}

/// Owns task mutations and their timer side effects.
pub struct SchedulerEngine {
    tasks: Arc<dyn TaskStore>,
    scheduler: Scheduler,
    queue: mpsc::UnboundedSender<JobRequest>,
    /// Schedule each job name was last armed with. The lock also
    /// serialises every mutation.
    armed: Mutex<HashMap<String, Schedule>>,
}

impl SchedulerEngine {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        scheduler: Scheduler,
        queue: mpsc::UnboundedSender<JobRequest>,
    ) -> Self {
        Self {
            tasks,
            scheduler,
            queue,
            armed: Mutex::new(HashMap::new()),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Insert or update a task, then re-arm its timer.
    /// A task without an id is inserted and gets `job_name = task_<id>`.
    pub async fn save_task(&self, mut task: Task) -> Result<Task> {
        let mut armed = self.armed.lock().await;
        task.normalize();
        task.validate()?;

        match task.id {
            None => {
                let id = self.tasks.insert(&task)?;
                task.id = Some(id);
                task.job_name = Task::job_name_for(id);
                self.tasks.update(&task)?;
                tracing::info!("📅 Task added: '{}' ({})", task.name, id);
            }
            Some(id) => {
                let existing = self
                    .tasks
                    .get_by_id(id)?
                    .ok_or(ClawJobsError::TaskNotFound(id))?;
                task.created_at = existing.created_at;
                task.job_name = if existing.job_name.is_empty() {
                    Task::job_name_for(id)
                } else {
                    existing.job_name
                };
                self.tasks.update(&task)?;
                tracing::info!("📝 Task updated: '{}' ({})", task.name, id);
            }
        }

        self.rearm(&mut armed, &task);
        Ok(task)
    }

    /// Cancel the task's timer and remove it. Run history is kept.
    pub async fn delete_task(&self, id: TaskId) -> Result<()> {
        let mut armed = self.armed.lock().await;
        let task = self.load(id)?;
        self.scheduler.cancel(&task.job_name);
        armed.remove(&task.job_name);
        self.tasks.delete(id)?;
        tracing::info!("🗑️ Task deleted: '{}' ({})", task.name, id);
        Ok(())
    }

    pub async fn set_enabled(&self, id: TaskId, enabled: bool) -> Result<Task> {
        let mut armed = self.armed.lock().await;
        let mut task = self.load(id)?;
        task.enabled = enabled;
        self.tasks.update(&task)?;
        self.rearm(&mut armed, &task);
        tracing::info!(
            "{} Task '{}' {}",
            if enabled { "▶️" } else { "⏸️" },
            task.name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(task)
    }

    /// Enqueue one immediate execution. Does not touch the schedule.
    pub async fn run_now(&self, id: TaskId) -> Result<()> {
        let _armed = self.armed.lock().await;
        let task = self.load(id)?;
        self.queue
            .send(JobRequest {
                task_id: id,
                trigger: Trigger::Manual,
            })
            .map_err(|_| ClawJobsError::Configuration("Job worker is not running".into()))?;
        tracing::info!("🚀 Queued manual run of '{}'", task.name);
        Ok(())
    }

    /// Re-arm every enabled task (process start). Returns how many were armed.
    pub async fn restore(&self) -> Result<usize> {
        let mut armed = self.armed.lock().await;
        for name in armed.drain().map(|(name, _)| name).collect::<Vec<_>>() {
            self.scheduler.cancel(&name);
        }
        for task in self.tasks.list_all()? {
            if task.enabled {
                self.rearm(&mut armed, &task);
            }
        }
        tracing::info!("⏰ Restored {} scheduled task(s)", armed.len());
        Ok(armed.len())
    }

    /// Bring timers in line with the store after edits made elsewhere:
    /// disabled or deleted tasks lose their timer, new or re-scheduled
    /// enabled tasks get one. Unchanged tasks keep their running timer.
    /// Returns how many job names changed.
    pub async fn reconcile(&self) -> Result<usize> {
        let mut armed = self.armed.lock().await;
        let tasks = self.tasks.list_all()?;
        let mut changed = 0;

        let mut present = HashSet::new();
        for task in &tasks {
            present.insert(task.job_name.clone());
            let wanted = task.enabled.then_some(&task.schedule);
            if armed.get(&task.job_name) == wanted {
                continue;
            }
            self.rearm(&mut armed, task);
            changed += 1;
        }

        let removed: Vec<String> = armed
            .keys()
            .filter(|name| !present.contains(*name))
            .cloned()
            .collect();
        for name in removed {
            self.scheduler.cancel(&name);
            armed.remove(&name);
            changed += 1;
        }

        if changed > 0 {
            tracing::info!("🔄 Reconciled {} job(s) with the task store", changed);
        }
        Ok(changed)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.tasks.list_all()
    }

    pub fn get_task(&self, id: TaskId) -> Result<Task> {
        self.load(id)
    }

    /// Cancel, then arm if enabled, recording what was armed.
    fn rearm(&self, armed: &mut HashMap<String, Schedule>, task: &Task) {
        self.scheduler.cancel(&task.job_name);
        if task.enabled && self.scheduler.schedule(task) {
            armed.insert(task.job_name.clone(), task.schedule.clone());
        } else {
            armed.remove(&task.job_name);
        }
    }

    fn load(&self, id: TaskId) -> Result<Task> {
        self.tasks
            .get_by_id(id)?
            .ok_or(ClawJobsError::TaskNotFound(id))
    }
}

/// Spawn the job worker as a background tokio task.
/// Each request runs concurrently with its own retry budget; the worker
/// stops when every queue sender is gone.
pub fn spawn_job_worker(
    mut queue: mpsc::UnboundedReceiver<JobRequest>,
    executor: Arc<JobExecutor>,
    policy: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "⏰ Job worker started (max {} attempts per job)",
            policy.max_attempts
        );
        while let Some(request) = queue.recv().await {
            let executor = executor.clone();
            tokio::spawn(async move {
                tracing::debug!("▶️ {} run of task {}", request.trigger, request.task_id);
                let result = run_with_retry(&policy, |_| executor.execute_request(request)).await;
                if let Err(failure) = result {
                    tracing::debug!("Job for task {} ended in failure: {}", request.task_id, failure);
                }
            });
        }
        tracing::info!("⏹️ Job worker stopped");
    })
}

/// Reconcile the engine with the store every `every`. Runs until aborted.
pub fn spawn_reconciler(engine: Arc<SchedulerEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("🔄 Reconciler started (check every {:?})", every);
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = engine.reconcile().await {
                tracing::warn!("⚠️ Reconcile failed: {}", e);
            }
        }
    })
}
