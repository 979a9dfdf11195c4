//! # ClawJobs Scheduler
//!
//! Runs saved prompts against the Messages API on a schedule.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (save / delete / enable / run-now / restore / reconcile)
//!   ├── TaskStore (SQLite, shared with one-shot CLI commands)
//!   └── Scheduler → TimerService (one tokio timer per job name)
//!                     └── on fire → JobRequest queue
//!
//! Job worker (per request, with retry)
//!   └── JobExecutor
//!         ├── CompletionClient (pause_turn continuation, ≤ 5 rounds)
//!         ├── RunStore (one record per attempt)
//!         └── NotifyRouter → log, webhook, Telegram
//! ```

pub mod delay;
pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod notify;
pub mod persistence;
pub mod retry;
pub mod store;
pub mod tasks;
pub mod timer;

pub use engine::{spawn_job_worker, spawn_reconciler, Scheduler, SchedulerEngine};
pub use executor::{JobExecutor, JobFailure, RunSummary, MAX_ROUNDS};
pub use notify::{Notification, NotifyKind, NotifyRouter};
pub use persistence::SqliteStore;
pub use retry::RetryPolicy;
pub use store::MemoryStore;
pub use timer::{
    DetachedTimers, ExistingPolicy, JobRequest, TimerPlan, TimerService, TimerSpec, TokioTimers,
    Trigger,
};
