//! Run history: one record per finished execution attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Task, TaskId};

/// Store-assigned run identifier.
pub type RunId = i64;

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(RunStatus::Success),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only run record. Task name and prompt are snapshots so the
/// history outlives edits and deletion of the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Option<RunId>,
    pub task_id: TaskId,
    pub task_name: String,
    pub prompt: String,
    pub status: RunStatus,
    /// Empty unless `status == Success`.
    pub response_text: String,
    /// Empty unless `status == Failed`.
    pub error_message: String,
    pub executed_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn success(task: &Task, response_text: String, executed_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            task_id: task.id.unwrap_or_default(),
            task_name: task.name.clone(),
            prompt: task.prompt.clone(),
            status: RunStatus::Success,
            response_text,
            error_message: String::new(),
            executed_at,
        }
    }

    pub fn failed(task: &Task, error_message: String, executed_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            task_id: task.id.unwrap_or_default(),
            task_name: task.name.clone(),
            prompt: task.prompt.clone(),
            status: RunStatus::Failed,
            response_text: String::new(),
            error_message,
            executed_at,
        }
    }
}
