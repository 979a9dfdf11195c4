//! # ClawJobs — scheduled LLM jobs
//!
//! Save a prompt with a schedule; the `serve` daemon runs it against the
//! Messages API, keeps every answer and notifies you.
//!
//! Usage:
//!   clawjobs add --name news --prompt "Top AI news today" --daily 08:00 --web-search
//!   clawjobs list
//!   clawjobs run 1                   # run once in the foreground
//!   clawjobs history --task 1
//!   clawjobs serve                   # keep timers armed and execute jobs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use clawjobs_core::JobsConfig;
use clawjobs_core::traits::{CredentialStore, RunStore, TaskStore};
use clawjobs_core::types::{RunStatus, Schedule, Task, TaskId};
use clawjobs_providers::AnthropicClient;
use clawjobs_scheduler::retry::run_with_retry;
use clawjobs_scheduler::{
    DetachedTimers, JobExecutor, JobRequest, NotifyRouter, RetryPolicy, Scheduler,
    SchedulerEngine, SqliteStore, TokioTimers, spawn_job_worker, spawn_reconciler,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clawjobs", version, about = "⏰ ClawJobs — scheduled LLM jobs")]
struct Cli {
    /// Config file (default ~/.clawjobs/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a task.
    Add(AddArgs),
    /// List tasks.
    List,
    /// Enable a task and arm its timer.
    Enable { id: TaskId },
    /// Disable a task and cancel its timer.
    Disable { id: TaskId },
    /// Delete a task. Its run history is kept.
    Delete { id: TaskId },
    /// Run a task once now, in the foreground.
    Run { id: TaskId },
    /// Show past runs, newest first.
    History {
        /// Only runs of this task
        #[arg(long)]
        task: Option<TaskId>,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show one run in full.
    Show { run_id: i64 },
    /// Delete one run record.
    DeleteRun { run_id: i64 },
    /// Store the Anthropic API key in the config file.
    SetKey { key: String },
    /// Set the model used for every task.
    SetModel { model: String },
    /// Arm timers for all enabled tasks and execute jobs until Ctrl+C.
    Serve,
}

#[derive(Args)]
struct AddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    system: Option<String>,
    #[arg(long, default_value = "4096")]
    max_tokens: u32,
    #[command(flatten)]
    schedule: ScheduleArgs,
    #[arg(long)]
    web_search: bool,
    #[arg(long)]
    web_fetch: bool,
    #[arg(long)]
    code_execution: bool,
    /// Save without arming a timer
    #[arg(long)]
    disabled: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ScheduleArgs {
    /// Every day at HH:MM (local time)
    #[arg(long, value_name = "HH:MM")]
    daily: Option<String>,
    /// Every week, e.g. `mon@08:30` or `1@08:30`
    #[arg(long, value_name = "DAY@HH:MM")]
    weekly: Option<String>,
    /// Every N hours, first run immediately
    #[arg(long, value_name = "HOURS")]
    every: Option<u32>,
    /// Once, at an RFC 3339 instant
    #[arg(long, value_name = "RFC3339")]
    at: Option<String>,
}

impl ScheduleArgs {
    fn to_schedule(&self) -> Result<Schedule> {
        if let Some(s) = &self.daily {
            let (hour, minute) = parse_hh_mm(s)?;
            return Ok(Schedule::Daily { hour, minute });
        }
        if let Some(s) = &self.weekly {
            let (day, time) = s
                .split_once('@')
                .ok_or_else(|| anyhow!("weekly schedule must look like DAY@HH:MM, got '{s}'"))?;
            let (hour, minute) = parse_hh_mm(time)?;
            return Ok(Schedule::Weekly {
                day_of_week: parse_weekday(day)?,
                hour,
                minute,
            });
        }
        if let Some(hours) = self.every {
            return Ok(Schedule::Interval { hours });
        }
        if let Some(s) = &self.at {
            let run_at = DateTime::parse_from_rfc3339(s)
                .with_context(|| format!("invalid --at '{s}'"))?
                .with_timezone(&Utc);
            return Ok(Schedule::OneTime { run_at });
        }
        bail!("a schedule is required (--daily, --weekly, --every or --at)")
    }
}

fn parse_hh_mm(s: &str) -> Result<(u32, u32)> {
    let (h, m) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| anyhow!("time must be HH:MM, got '{s}'"))?;
    Ok((
        h.parse().with_context(|| format!("bad hour in '{s}'"))?,
        m.parse().with_context(|| format!("bad minute in '{s}'"))?,
    ))
}

/// ISO weekday from a number (1 = Monday) or an English day name.
fn parse_weekday(s: &str) -> Result<u32> {
    const NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
    let s = s.trim().to_lowercase();
    if let Ok(n) = s.parse::<u32>() {
        return Ok(n);
    }
    NAMES
        .iter()
        .position(|name| s.starts_with(name))
        .map(|i| i as u32 + 1)
        .ok_or_else(|| anyhow!("unknown weekday '{s}'"))
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

struct App {
    config: JobsConfig,
    config_path: PathBuf,
    store: Arc<SqliteStore>,
}

impl App {
    fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(JobsConfig::default_path);
        let config = if config_path.exists() {
            JobsConfig::load_from(&config_path)?
        } else {
            JobsConfig::default()
        };
        let db_path = expand_path(&config.database_file().to_string_lossy());
        let store = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("opening {}", db_path.display()))?,
        );
        Ok(Self {
            config,
            config_path,
            store,
        })
    }

    fn executor(&self, notifier: Arc<NotifyRouter>) -> Result<JobExecutor> {
        let client = AnthropicClient::from_config(&self.config.api)?;
        Ok(JobExecutor::new(
            self.store.clone(),
            self.store.clone(),
            Arc::new(self.config.api.clone()),
            Arc::new(client),
            notifier,
        )
        .with_max_rounds(self.config.scheduler.max_rounds))
    }

    /// Engine for one-shot commands: edits the store, arms nothing.
    /// A running `serve` picks the change up on its next reconcile.
    fn engine(&self) -> (SchedulerEngine, mpsc::UnboundedReceiver<JobRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine =
            SchedulerEngine::new(self.store.clone(), Scheduler::new(Arc::new(DetachedTimers)), tx);
        (engine, rx)
    }

    /// Engine whose timers live as long as this process.
    fn daemon_engine(&self) -> (SchedulerEngine, mpsc::UnboundedReceiver<JobRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = Arc::new(TokioTimers::new(tx.clone()));
        let engine = SchedulerEngine::new(self.store.clone(), Scheduler::new(timers), tx);
        (engine, rx)
    }

    fn save_config(&self) -> Result<()> {
        self.config.save_to(&self.config_path)?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "clawjobs=debug,clawjobs_scheduler=debug,clawjobs_providers=debug"
    } else {
        "clawjobs=info,clawjobs_scheduler=info,clawjobs_providers=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut app = App::load(&cli)?;

    match cli.command {
        Command::Add(args) => add(&app, args).await,
        Command::List => list(&app),
        Command::Enable { id } => set_enabled(&app, id, true).await,
        Command::Disable { id } => set_enabled(&app, id, false).await,
        Command::Delete { id } => {
            let (engine, _rx) = app.engine();
            engine.delete_task(id).await?;
            println!("🗑️  Deleted task {id}");
            Ok(())
        }
        Command::Run { id } => run_once(&app, id).await,
        Command::History { task, limit } => history(&app, task, limit),
        Command::Show { run_id } => show_run(&app, run_id),
        Command::DeleteRun { run_id } => {
            app.store.delete_by_id(run_id)?;
            println!("🗑️  Deleted run {run_id}");
            Ok(())
        }
        Command::SetKey { key } => {
            app.config.api.api_key = key.trim().to_string();
            app.save_config()?;
            println!("🔑 API key saved to {}", app.config_path.display());
            Ok(())
        }
        Command::SetModel { model } => {
            app.config.api.model = model.trim().to_string();
            app.save_config()?;
            println!("🧠 Model set to {}", app.config.api.model());
            Ok(())
        }
        Command::Serve => serve(&app).await,
    }
}

async fn add(app: &App, args: AddArgs) -> Result<()> {
    let mut task = Task::new(&args.name, &args.prompt, args.schedule.to_schedule()?);
    task.system_prompt = args.system;
    task.max_tokens = args.max_tokens;
    task.enable_web_search = args.web_search;
    task.enable_web_fetch = args.web_fetch;
    task.enable_code_execution = args.code_execution;
    task.enabled = !args.disabled;

    let (engine, _rx) = app.engine();
    let task = engine.save_task(task).await?;
    println!(
        "📅 Added task {} '{}' ({})",
        task.id.unwrap_or_default(),
        task.name,
        task.schedule
    );
    if task.enabled {
        println!("   A running `clawjobs serve` arms it within {}s.", app.config.scheduler.reconcile_secs);
    }
    Ok(())
}

async fn set_enabled(app: &App, id: TaskId, enabled: bool) -> Result<()> {
    let (engine, _rx) = app.engine();
    let task = engine.set_enabled(id, enabled).await?;
    println!(
        "{} '{}' {}",
        if enabled { "▶️ " } else { "⏸️ " },
        task.name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn list(app: &App) -> Result<()> {
    let tasks = TaskStore::list_all(app.store.as_ref())?;
    if tasks.is_empty() {
        println!("No tasks yet. Create one with `clawjobs add`.");
        return Ok(());
    }
    for task in tasks {
        let id = task.id.unwrap_or_default();
        let latest = app.store.latest_for_task(id)?;
        let last = match latest {
            Some(run) => format!(
                "{} {}",
                run.status,
                run.executed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            ),
            None => "never run".to_string(),
        };
        let mut tools = Vec::new();
        if task.enable_web_search {
            tools.push("search");
        }
        if task.enable_web_fetch {
            tools.push("fetch");
        }
        if task.enable_code_execution {
            tools.push("code");
        }
        println!(
            "{:>4}  {} {:<24} {:<28} [{}]  {}",
            id,
            if task.enabled { "●" } else { "○" },
            task.name,
            task.schedule.to_string(),
            tools.join(","),
            last
        );
    }
    Ok(())
}

fn history(app: &App, task: Option<TaskId>, limit: usize) -> Result<()> {
    let runs = match task {
        Some(id) => app.store.list_for_task(id)?,
        None => RunStore::list_all(app.store.as_ref())?,
    };
    if runs.is_empty() {
        println!("No runs yet.");
    }
    for run in runs.into_iter().take(limit) {
        let summary = match run.status {
            RunStatus::Success => clawjobs_scheduler::executor::preview(&run.response_text),
            RunStatus::Failed => run.error_message.clone(),
        };
        println!(
            "#{:<5} {}  {:<7} {:<20} {}",
            run.id.unwrap_or_default(),
            run.executed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            run.status,
            run.task_name,
            summary.replace('\n', " ")
        );
    }
    Ok(())
}

fn show_run(app: &App, run_id: i64) -> Result<()> {
    let run = RunStore::get_by_id(app.store.as_ref(), run_id)?
        .ok_or(clawjobs_core::ClawJobsError::RunNotFound(run_id))?;
    println!("Run #{} — {} ({})", run_id, run.task_name, run.status);
    println!("Executed: {}", run.executed_at.with_timezone(&Local).to_rfc2822());
    println!("Prompt:   {}\n", run.prompt);
    match run.status {
        RunStatus::Success => println!("{}", run.response_text),
        RunStatus::Failed => println!("Error: {}", run.error_message),
    }
    Ok(())
}

async fn run_once(app: &App, id: TaskId) -> Result<()> {
    let task = TaskStore::get_by_id(app.store.as_ref(), id)?
        .ok_or(clawjobs_core::ClawJobsError::TaskNotFound(id))?;
    println!("🤖 Running '{}' …", task.name);

    // Queue a manual request, then work it off in the foreground.
    let (engine, mut queue) = app.engine();
    engine.run_now(id).await?;
    drop(engine);
    let request = queue
        .recv()
        .await
        .ok_or_else(|| anyhow!("manual run for task {id} was not queued"))?;

    let notifier = Arc::new(NotifyRouter::from_config(&app.config.notify));
    let executor = app.executor(notifier)?;
    let policy = RetryPolicy::from_config(&app.config.scheduler);
    match run_with_retry(&policy, |_| executor.execute_request(request)).await {
        Ok(None) => Ok(()),
        Ok(Some(summary)) => {
            println!(
                "✅ Run #{} ({} round(s), stop_reason={})\n\n{}",
                summary.run_id, summary.rounds, summary.stop_reason, summary.text
            );
            Ok(())
        }
        Err(failure) => Err(anyhow!("❌ {}", failure.message)),
    }
}

async fn serve(app: &App) -> Result<()> {
    println!("⏰ ClawJobs v{}", env!("CARGO_PKG_VERSION"));
    if app.config.api.api_key().trim().is_empty() {
        tracing::warn!("⚠️  No API key configured; jobs will fail until `clawjobs set-key` is run.");
    }

    let notifier = Arc::new(NotifyRouter::from_config(&app.config.notify));
    let targets = notifier.target_names();
    if !targets.is_empty() {
        println!("   Notifications → {}", targets.join(", "));
    }
    let executor = Arc::new(app.executor(notifier)?);
    let (engine, rx) = app.daemon_engine();
    let engine = Arc::new(engine);
    let worker = spawn_job_worker(rx, executor, RetryPolicy::from_config(&app.config.scheduler));

    let armed = engine.restore().await?;
    println!("   {} task(s) armed, model {}. Press Ctrl+C to stop.", armed, app.config.api.model());
    let reconciler = spawn_reconciler(
        engine.clone(),
        Duration::from_secs(app.config.scheduler.reconcile_secs.max(1)),
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, shutting down...");
    reconciler.abort();
    drop(engine);
    worker.abort();
    Ok(())
}
