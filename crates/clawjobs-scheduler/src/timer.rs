//! Named timers — the "replace-by-name / cancel-by-name" service the
//! scheduler arms. A fired timer only enqueues a [`JobRequest`]; running
//! the job is the worker's business, so timers never block on the network.
//!
//! `TokioTimers` keeps one tokio task per job name. RAM: one small task
//! per enabled job, zero CPU while sleeping.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use clawjobs_core::types::TaskId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What a fired timer hands to the job worker: the id only, so the
/// executor always reads the task as it is now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRequest {
    pub task_id: TaskId,
    pub trigger: Trigger,
}

/// Why a job was enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Timer shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSpec {
    /// Fire once after `delay`.
    Once { delay: Duration },
    /// Fire after `initial_delay`, then every `period` (fixed rate).
    Every {
        initial_delay: Duration,
        period: Duration,
    },
}

/// What to do when a timer with the same name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingPolicy {
    /// Drop the old timer and start fresh.
    Replace,
    /// Keep a live periodic timer's phase and only swap its period.
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerPlan {
    pub spec: TimerSpec,
    pub policy: ExistingPolicy,
}

/// Host timer registry keyed by job name. At most one live timer per name.
pub trait TimerService: Send + Sync {
    fn arm(&self, job_name: &str, task_id: TaskId, plan: TimerPlan);

    /// Remove the timer registered under `job_name`. Returns whether one was live.
    fn cancel(&self, job_name: &str) -> bool;

    fn is_armed(&self, job_name: &str) -> bool;

    /// Names of all live timers, sorted.
    fn armed(&self) -> Vec<String>;
}

struct TimerEntry {
    handle: JoinHandle<()>,
    /// Present for periodic timers; pushes a new period into the loop.
    period: Option<watch::Sender<Duration>>,
}

impl TimerEntry {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Tokio-backed [`TimerService`]. Must be used inside a tokio runtime.
pub struct TokioTimers {
    jobs: Mutex<HashMap<String, TimerEntry>>,
    queue: mpsc::UnboundedSender<JobRequest>,
}

impl TokioTimers {
    pub fn new(queue: mpsc::UnboundedSender<JobRequest>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            queue,
        }
    }

    fn spawn(&self, job_name: &str, task_id: TaskId, spec: TimerSpec) -> TimerEntry {
        let queue = self.queue.clone();
        let name = job_name.to_string();
        match spec {
            TimerSpec::Once { delay } => TimerEntry {
                handle: tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    fire(&name, task_id, &queue);
                }),
                period: None,
            },
            TimerSpec::Every {
                initial_delay,
                period,
            } => {
                let (tx, rx) = watch::channel(period);
                TimerEntry {
                    handle: tokio::spawn(run_periodic(name, task_id, initial_delay, rx, queue)),
                    period: Some(tx),
                }
            }
        }
    }
}

impl TimerService for TokioTimers {
    fn arm(&self, job_name: &str, task_id: TaskId, plan: TimerPlan) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.retain(|_, entry| entry.is_live());

        if let (ExistingPolicy::Update, TimerSpec::Every { period, .. }) = (plan.policy, plan.spec)
            && let Some(existing) = jobs.get(job_name)
            && let Some(tx) = &existing.period
        {
            tx.send_replace(period.max(Duration::from_secs(1)));
            tracing::debug!("🔁 Timer '{}' updated in place (period {:?})", job_name, period);
            return;
        }

        if let Some(old) = jobs.remove(job_name) {
            old.handle.abort();
        }
        let entry = self.spawn(job_name, task_id, plan.spec);
        jobs.insert(job_name.to_string(), entry);
    }

    fn cancel(&self, job_name: &str) -> bool {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        match jobs.remove(job_name) {
            Some(entry) => {
                let live = entry.is_live();
                entry.handle.abort();
                live
            }
            None => false,
        }
    }

    fn is_armed(&self, job_name: &str) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(job_name).is_some_and(TimerEntry::is_live)
    }

    fn armed(&self) -> Vec<String> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = jobs
            .iter()
            .filter(|(_, entry)| entry.is_live())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in jobs.drain() {
            entry.handle.abort();
        }
    }
}

/// Timer service for processes that only edit tasks (one-shot CLI commands).
/// Nothing is armed here; the `serve` process picks changes up when it
/// reconciles with the store.
#[derive(Debug, Default)]
pub struct DetachedTimers;

impl TimerService for DetachedTimers {
    fn arm(&self, job_name: &str, _task_id: TaskId, _plan: TimerPlan) {
        tracing::debug!("Timer '{}' left to the serve process", job_name);
    }

    fn cancel(&self, _job_name: &str) -> bool {
        false
    }

    fn is_armed(&self, _job_name: &str) -> bool {
        false
    }

    fn armed(&self) -> Vec<String> {
        Vec::new()
    }
}

fn fire(job_name: &str, task_id: TaskId, queue: &mpsc::UnboundedSender<JobRequest>) -> bool {
    tracing::info!("🔔 Timer '{}' fired (task {})", job_name, task_id);
    queue
        .send(JobRequest {
            task_id,
            trigger: Trigger::Scheduled,
        })
        .is_ok()
}

/// Fixed-rate loop. Missed ticks (host asleep) are skipped, not replayed.
async fn run_periodic(
    job_name: String,
    task_id: TaskId,
    initial_delay: Duration,
    mut period_rx: watch::Receiver<Duration>,
    queue: mpsc::UnboundedSender<JobRequest>,
) {
    let mut next = Instant::now() + initial_delay;
    loop {
        tokio::time::sleep_until(next).await;
        if !fire(&job_name, task_id, &queue) {
            tracing::debug!("Job queue closed; timer '{}' stops", job_name);
            return;
        }

        let period = (*period_rx.borrow_and_update()).max(Duration::from_secs(1));
        next += period;
        let now = Instant::now();
        while next <= now {
            next += period;
        }
    }
}
