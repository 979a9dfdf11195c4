//! SQLite-backed persistence for tasks and run history.
//! Survives restarts; run records are not tied to the task row, so
//! history outlives task deletion.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use clawjobs_core::error::{ClawJobsError, Result};
use clawjobs_core::traits::{RunStore, TaskStore};
use clawjobs_core::types::{
    RunId, RunRecord, RunStatus, Schedule, ScheduleKind, Task, TaskId, DEFAULT_MAX_TOKENS,
};

const TASK_COLUMNS: &str = "id, name, prompt, system_prompt, max_tokens, schedule_type, \
     hour_of_day, minute_of_hour, day_of_week, interval_hours, run_at, \
     enable_web_search, enable_web_fetch, enable_code_execution, is_enabled, job_name, created_at";

const RUN_COLUMNS: &str =
    "id, task_id, task_name, prompt, response_text, status, error_message, executed_at";

/// SQLite store implementing both [`TaskStore`] and [`RunStore`].
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(|e| db_err("DB open", e))?;
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| db_err("DB open", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "
            -- Scheduled prompts
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                prompt TEXT NOT NULL,
                system_prompt TEXT,
                max_tokens INTEGER NOT NULL DEFAULT 4096,
                schedule_type TEXT NOT NULL,        -- 'DAILY', 'WEEKLY', 'INTERVAL', 'ONE_TIME'
                hour_of_day INTEGER NOT NULL DEFAULT 9,
                minute_of_hour INTEGER NOT NULL DEFAULT 0,
                day_of_week INTEGER NOT NULL DEFAULT 1,   -- ISO: 1 = Monday
                interval_hours INTEGER NOT NULL DEFAULT 6,
                run_at TEXT,
                enable_web_search INTEGER NOT NULL DEFAULT 0,
                enable_web_fetch INTEGER NOT NULL DEFAULT 0,
                enable_code_execution INTEGER NOT NULL DEFAULT 0,
                is_enabled INTEGER NOT NULL DEFAULT 1,
                job_name TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            -- One row per finished execution attempt
            CREATE TABLE IF NOT EXISTS task_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL,
                task_name TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response_text TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,               -- 'SUCCESS', 'FAILED'
                error_message TEXT NOT NULL DEFAULT '',
                executed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_task_runs_task ON task_runs(task_id);
         ",
            )
            .map_err(|e| db_err("Migration", e))
    }

    fn query_tasks(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Task>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql).map_err(|e| db_err("Load tasks", e))?;
        let rows = stmt
            .query_map(params, task_from_row)
            .map_err(|e| db_err("Load tasks", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("Load tasks", e))
    }

    fn query_runs(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<RunRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql).map_err(|e| db_err("Load runs", e))?;
        let rows = stmt
            .query_map(params, run_from_row)
            .map_err(|e| db_err("Load runs", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("Load runs", e))
    }
}

fn db_err(context: &str, e: rusqlite::Error) -> ClawJobsError {
    ClawJobsError::Database(format!("{context}: {e}"))
}

/// Flattened schedule columns: (type, hour, minute, day_of_week, interval, run_at).
/// Fields the schedule does not use keep their column defaults.
fn schedule_columns(schedule: &Schedule) -> (&'static str, u32, u32, u32, u32, Option<String>) {
    let kind = schedule.kind().as_str();
    match schedule {
        Schedule::Daily { hour, minute } => (kind, *hour, *minute, 1, 6, None),
        Schedule::Weekly {
            day_of_week,
            hour,
            minute,
        } => (kind, *hour, *minute, *day_of_week, 6, None),
        Schedule::Interval { hours } => (kind, 9, 0, 1, *hours, None),
        Schedule::OneTime { run_at } => (kind, 9, 0, 1, 6, Some(format_time(run_at))),
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Corrupt rows fail the query instead of loading with made-up values.
fn bad_column(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn parse_time(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let schedule_type: String = row.get(5)?;
    let hour: u32 = row.get(6)?;
    let minute: u32 = row.get(7)?;
    let day_of_week: u32 = row.get(8)?;
    let interval_hours: u32 = row.get(9)?;
    let run_at: Option<String> = row.get(10)?;

    let kind = ScheduleKind::parse(&schedule_type)
        .ok_or_else(|| bad_column(5, format!("unknown schedule type '{schedule_type}'")))?;
    let schedule = match kind {
        ScheduleKind::Daily => Schedule::Daily { hour, minute },
        ScheduleKind::Weekly => Schedule::Weekly {
            day_of_week,
            hour,
            minute,
        },
        ScheduleKind::OneTime => {
            let run_at = run_at
                .ok_or_else(|| bad_column(10, "one-time task without run_at".into()))?;
            Schedule::OneTime {
                run_at: parse_time(10, &run_at)?,
            }
        }
        ScheduleKind::Interval => Schedule::Interval {
            hours: interval_hours,
        },
    };

    let created_at: String = row.get(16)?;
    Ok(Task {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        prompt: row.get(2)?,
        system_prompt: row.get(3)?,
        max_tokens: row.get::<_, Option<u32>>(4)?.unwrap_or(DEFAULT_MAX_TOKENS),
        schedule,
        enable_web_search: row.get::<_, i32>(11)? != 0,
        enable_web_fetch: row.get::<_, i32>(12)? != 0,
        enable_code_execution: row.get::<_, i32>(13)? != 0,
        enabled: row.get::<_, i32>(14)? != 0,
        job_name: row.get(15)?,
        created_at: parse_time(16, &created_at)?,
    })
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(5)?;
    let executed_at: String = row.get(7)?;
    Ok(RunRecord {
        id: Some(row.get(0)?),
        task_id: row.get(1)?,
        task_name: row.get(2)?,
        prompt: row.get(3)?,
        response_text: row.get(4)?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| bad_column(5, format!("unknown run status '{status}'")))?,
        error_message: row.get(6)?,
        executed_at: parse_time(7, &executed_at)?,
    })
}

impl TaskStore for SqliteStore {
    fn get_by_id(&self, id: TaskId) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        Ok(self.query_tasks(&sql, &[&id])?.into_iter().next())
    }

    fn insert(&self, task: &Task) -> Result<TaskId> {
        let (kind, hour, minute, dow, interval, run_at) = schedule_columns(&task.schedule);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO tasks
             (name, prompt, system_prompt, max_tokens, schedule_type, hour_of_day, minute_of_hour,
              day_of_week, interval_hours, run_at, enable_web_search, enable_web_fetch,
              enable_code_execution, is_enabled, job_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            rusqlite::params![
                task.name,
                task.prompt,
                task.system_prompt,
                task.max_tokens,
                kind,
                hour,
                minute,
                dow,
                interval,
                run_at,
                task.enable_web_search as i32,
                task.enable_web_fetch as i32,
                task.enable_code_execution as i32,
                task.enabled as i32,
                task.job_name,
                format_time(&task.created_at),
            ],
        )
        .map_err(|e| db_err("Save task", e))?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, task: &Task) -> Result<()> {
        let id = task
            .id
            .ok_or_else(|| ClawJobsError::Validation("task has no id".into()))?;
        let (kind, hour, minute, dow, interval, run_at) = schedule_columns(&task.schedule);
        let changed = self
            .conn()
            .execute(
                "UPDATE tasks SET
                 name = ?2, prompt = ?3, system_prompt = ?4, max_tokens = ?5, schedule_type = ?6,
                 hour_of_day = ?7, minute_of_hour = ?8, day_of_week = ?9, interval_hours = ?10,
                 run_at = ?11, enable_web_search = ?12, enable_web_fetch = ?13,
                 enable_code_execution = ?14, is_enabled = ?15, job_name = ?16
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    task.name,
                    task.prompt,
                    task.system_prompt,
                    task.max_tokens,
                    kind,
                    hour,
                    minute,
                    dow,
                    interval,
                    run_at,
                    task.enable_web_search as i32,
                    task.enable_web_fetch as i32,
                    task.enable_code_execution as i32,
                    task.enabled as i32,
                    task.job_name,
                ],
            )
            .map_err(|e| db_err("Update task", e))?;
        if changed == 0 {
            return Err(ClawJobsError::TaskNotFound(id));
        }
        Ok(())
    }

    fn delete(&self, id: TaskId) -> Result<()> {
        self.conn()
            .execute("DELETE FROM tasks WHERE id = ?1", [id])
            .map_err(|e| db_err("Delete task", e))?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at, id");
        self.query_tasks(&sql, &[])
    }
}

impl RunStore for SqliteStore {
    fn insert(&self, run: &RunRecord) -> Result<RunId> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO task_runs
             (task_id, task_name, prompt, response_text, status, error_message, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                run.task_id,
                run.task_name,
                run.prompt,
                run.response_text,
                run.status.as_str(),
                run.error_message,
                format_time(&run.executed_at),
            ],
        )
        .map_err(|e| db_err("Save run", e))?;
        Ok(conn.last_insert_rowid())
    }

    fn get_by_id(&self, id: RunId) -> Result<Option<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM task_runs WHERE id = ?1");
        Ok(self.query_runs(&sql, &[&id])?.into_iter().next())
    }

    fn list_all(&self) -> Result<Vec<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM task_runs ORDER BY executed_at DESC, id DESC");
        self.query_runs(&sql, &[])
    }

    fn list_for_task(&self, task_id: TaskId) -> Result<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM task_runs WHERE task_id = ?1 ORDER BY executed_at DESC, id DESC"
        );
        self.query_runs(&sql, &[&task_id])
    }

    fn latest_for_task(&self, task_id: TaskId) -> Result<Option<RunRecord>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM task_runs WHERE task_id = ?1 ORDER BY executed_at DESC, id DESC LIMIT 1"
        );
        Ok(self.query_runs(&sql, &[&task_id])?.into_iter().next())
    }

    fn delete_by_id(&self, id: RunId) -> Result<()> {
        self.conn()
            .execute("DELETE FROM task_runs WHERE id = ?1", [id])
            .map_err(|e| db_err("Delete run", e))?;
        Ok(())
    }
}
