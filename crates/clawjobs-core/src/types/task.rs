//! Task definitions — what to ask, when to ask it, and with which tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClawJobsError, Result};

/// Store-assigned task identifier.
pub type TaskId = i64;

pub const MIN_MAX_TOKENS: u32 = 256;
pub const MAX_MAX_TOKENS: u32 = 128_000;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// How/when the task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Every day at `hour:minute` local time.
    Daily { hour: u32, minute: u32 },
    /// Every week on an ISO weekday (1 = Monday … 7 = Sunday).
    Weekly {
        day_of_week: u32,
        hour: u32,
        minute: u32,
    },
    /// Every N hours, first run immediately.
    Interval { hours: u32 },
    /// Once, at an absolute instant.
    OneTime { run_at: DateTime<Utc> },
}

/// Discriminant of [`Schedule`], as stored in the `schedule_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleKind {
    Daily,
    Weekly,
    Interval,
    OneTime,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Daily => "DAILY",
            ScheduleKind::Weekly => "WEEKLY",
            ScheduleKind::Interval => "INTERVAL",
            ScheduleKind::OneTime => "ONE_TIME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DAILY" => Some(ScheduleKind::Daily),
            "WEEKLY" => Some(ScheduleKind::Weekly),
            "INTERVAL" => Some(ScheduleKind::Interval),
            "ONE_TIME" => Some(ScheduleKind::OneTime),
            _ => None,
        }
    }
}

impl Schedule {
    pub fn kind(&self) -> ScheduleKind {
        match self {
            Schedule::Daily { .. } => ScheduleKind::Daily,
            Schedule::Weekly { .. } => ScheduleKind::Weekly,
            Schedule::Interval { .. } => ScheduleKind::Interval,
            Schedule::OneTime { .. } => ScheduleKind::OneTime,
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        match self {
            Schedule::Daily { hour, minute } => write!(f, "daily at {hour:02}:{minute:02}"),
            Schedule::Weekly {
                day_of_week,
                hour,
                minute,
            } => {
                let day = DAYS
                    .get((*day_of_week as usize).wrapping_sub(1))
                    .copied()
                    .unwrap_or("?");
                write!(f, "weekly on {day} at {hour:02}:{minute:02}")
            }
            Schedule::Interval { hours } => write!(f, "every {hours}h"),
            Schedule::OneTime { run_at } => write!(f, "once at {}", run_at.to_rfc3339()),
        }
    }
}

/// A user-defined prompt plus its schedule and capability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the task store on first insert.
    pub id: Option<TaskId>,
    pub name: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub schedule: Schedule,
    pub enable_web_search: bool,
    pub enable_web_fetch: bool,
    pub enable_code_execution: bool,
    pub enabled: bool,
    /// Timer key, `task_<id>`. Empty until the task has an id.
    pub job_name: String,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new, unsaved, enabled task without tools.
    pub fn new(name: &str, prompt: &str, schedule: Schedule) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            prompt: prompt.to_string(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            schedule,
            enable_web_search: false,
            enable_web_fetch: false,
            enable_code_execution: false,
            enabled: true,
            job_name: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Deterministic timer key for a persisted task id.
    pub fn job_name_for(id: TaskId) -> String {
        format!("task_{id}")
    }

    /// Check user-supplied fields. Returns every problem in one message.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("name must not be blank".to_string());
        }
        if self.prompt.trim().is_empty() {
            problems.push("prompt must not be blank".to_string());
        }
        match &self.schedule {
            Schedule::Daily { hour, minute } => {
                check_time(*hour, *minute, &mut problems);
            }
            Schedule::Weekly {
                day_of_week,
                hour,
                minute,
            } => {
                if !(1..=7).contains(day_of_week) {
                    problems.push(format!("day_of_week {day_of_week} not in 1..=7"));
                }
                check_time(*hour, *minute, &mut problems);
            }
            Schedule::Interval { hours } => {
                if *hours == 0 {
                    problems.push("interval must be at least 1 hour".to_string());
                }
            }
            Schedule::OneTime { .. } => {}
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ClawJobsError::Validation(problems.join(", ")))
        }
    }

    /// Trim text fields, drop a blank system prompt and clamp numeric ranges.
    pub fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.prompt = self.prompt.trim().to_string();
        self.system_prompt = self
            .system_prompt
            .take()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.max_tokens = self.max_tokens.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS);
        if let Schedule::Interval { hours } = &mut self.schedule {
            *hours = (*hours).max(1);
        }
    }
}

fn check_time(hour: u32, minute: u32, problems: &mut Vec<String>) {
    if hour > 23 {
        problems.push(format!("hour {hour} not in 0..=23"));
    }
    if minute > 59 {
        problems.push(format!("minute {minute} not in 0..=59"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_name_and_prompt_rejected() {
        let task = Task::new("  ", "", Schedule::Interval { hours: 6 });
        let err = task.validate().unwrap_err().to_string();
        assert!(err.contains("name must not be blank"));
        assert!(err.contains("prompt must not be blank"));
    }

    #[test]
    fn test_valid_task_passes() {
        let task = Task::new("News", "Summarise today's news", Schedule::Daily { hour: 9, minute: 0 });
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_schedule_rejected() {
        let task = Task::new(
            "x",
            "y",
            Schedule::Weekly {
                day_of_week: 8,
                hour: 24,
                minute: 0,
            },
        );
        let err = task.validate().unwrap_err().to_string();
        assert!(err.contains("day_of_week 8"));
        assert!(err.contains("hour 24"));
    }

    #[test]
    fn test_normalize_clamps_and_trims() {
        let mut task = Task::new(" n ", " p ", Schedule::Interval { hours: 0 });
        task.max_tokens = 10;
        task.system_prompt = Some("   ".into());
        task.normalize();
        assert_eq!(task.name, "n");
        assert_eq!(task.prompt, "p");
        assert_eq!(task.max_tokens, MIN_MAX_TOKENS);
        assert_eq!(task.system_prompt, None);
        assert_eq!(task.schedule, Schedule::Interval { hours: 1 });

        task.max_tokens = 1_000_000;
        task.normalize();
        assert_eq!(task.max_tokens, MAX_MAX_TOKENS);
    }

    #[test]
    fn test_job_name_and_kind() {
        assert_eq!(Task::job_name_for(42), "task_42");
        let kind = Schedule::Weekly {
            day_of_week: 1,
            hour: 0,
            minute: 0,
        }
        .kind();
        assert_eq!(ScheduleKind::parse(kind.as_str()), Some(ScheduleKind::Weekly));
    }

    #[test]
    fn test_schedule_display() {
        let s = Schedule::Weekly {
            day_of_week: 7,
            hour: 8,
            minute: 5,
        };
        assert_eq!(s.to_string(), "weekly on Sun at 08:05");
        assert_eq!(Schedule::Interval { hours: 6 }.to_string(), "every 6h");
    }
}
