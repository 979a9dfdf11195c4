//! Job executor — runs one task once: loads it, talks to the completion
//! API (continuing `pause_turn` responses up to a round cap), records the
//! outcome and notifies the user.
//!
//! ```text
//! JobRequest(task_id, trigger)
//!   ├── load task ──────────── missing → fatal, nothing recorded
//!   ├── scheduled + disabled ─ skipped, nothing recorded
//!   ├── api key ────────────── blank → FAILED record + error notice, fatal
//!   ├── round 1..=max_rounds
//!   │     ├── send(transcript)
//!   │     ├── append text blocks to output
//!   │     └── pause_turn → echo assistant blocks + "Continue."
//!   ├── SUCCESS record → success notice (150-char preview)
//!   └── any error → FAILED record → error notice (retryable per error kind)
//! ```

use std::sync::Arc;

use chrono::Utc;
use clawjobs_core::error::ClawJobsError;
use clawjobs_core::traits::{
    CompletionClient, CredentialStore, NotificationSink, RunStore, TaskStore,
};
use clawjobs_core::types::{
    Message, MessageRequest, RunId, RunRecord, StopReason, Task, TaskId,
};
use clawjobs_providers::build_manifest;

use crate::timer::{JobRequest, Trigger};

/// Upper bound on requests per invocation.
pub const MAX_ROUNDS: usize = 5;

/// Characters of the response shown in a success notification.
pub const PREVIEW_CHARS: usize = 150;

/// User turn appended after a `pause_turn` response.
pub const CONTINUE_PROMPT: &str = "Continue.";

pub const MISSING_KEY_MESSAGE: &str =
    "API key not configured. Run `clawjobs set-key <KEY>` or set ANTHROPIC_API_KEY.";

/// Outcome of a successful invocation.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    pub task_id: TaskId,
    /// Requests sent, 1..=max_rounds.
    pub rounds: usize,
    pub stop_reason: String,
    /// Stored response text (placeholder when the model produced none).
    pub text: String,
}

/// Outcome of a failed invocation. `retryable` tells the worker whether
/// to run the whole job again.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct JobFailure {
    pub message: String,
    /// Set when a FAILED record was written.
    pub run_id: Option<RunId>,
    pub retryable: bool,
}

impl JobFailure {
    fn from_error(err: &ClawJobsError, run_id: Option<RunId>) -> Self {
        Self {
            message: err.to_string(),
            run_id,
            retryable: err.is_retryable(),
        }
    }
}

/// Text and stop state gathered over all rounds.
struct Conversation {
    text: String,
    rounds: usize,
    stop_reason: StopReason,
}

impl Conversation {
    fn resolved_text(&self) -> String {
        let text = self.text.trim();
        if text.is_empty() {
            format!(
                "(No text response — stop_reason: {})",
                self.stop_reason.as_str()
            )
        } else {
            text.to_string()
        }
    }
}

/// Executes jobs against injected stores, client and notifier.
/// Cheap to share: everything is behind `Arc`.
pub struct JobExecutor {
    tasks: Arc<dyn TaskStore>,
    runs: Arc<dyn RunStore>,
    credentials: Arc<dyn CredentialStore>,
    client: Arc<dyn CompletionClient>,
    notifier: Arc<dyn NotificationSink>,
    max_rounds: usize,
}

impl JobExecutor {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        runs: Arc<dyn RunStore>,
        credentials: Arc<dyn CredentialStore>,
        client: Arc<dyn CompletionClient>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            tasks,
            runs,
            credentials,
            client,
            notifier,
            max_rounds: MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Run task `task_id` once. Exactly one run record is written unless
    /// the task no longer exists.
    pub async fn execute(&self, task_id: TaskId) -> Result<RunSummary, JobFailure> {
        let task = self.load(task_id)?;
        self.run(task_id, task).await
    }

    /// Run a queued job. A scheduled fire for a task that has been disabled
    /// since the timer was armed is skipped: no record, no notification.
    pub async fn execute_request(
        &self,
        request: JobRequest,
    ) -> Result<Option<RunSummary>, JobFailure> {
        let task = self.load(request.task_id)?;
        if request.trigger == Trigger::Scheduled && !task.enabled {
            tracing::info!(
                "⏸️ Task '{}' ({}) is disabled, skipping scheduled run",
                task.name,
                request.task_id
            );
            return Ok(None);
        }
        self.run(request.task_id, task).await.map(Some)
    }

    fn load(&self, task_id: TaskId) -> Result<Task, JobFailure> {
        match self.tasks.get_by_id(task_id) {
            Ok(Some(task)) => Ok(task),
            Ok(None) => {
                tracing::warn!("⚠️ Task {} no longer exists, skipping job", task_id);
                Err(JobFailure::from_error(
                    &ClawJobsError::TaskNotFound(task_id),
                    None,
                ))
            }
            Err(e) => {
                tracing::error!("❌ Failed to load task {}: {}", task_id, e);
                Err(JobFailure::from_error(&e, None))
            }
        }
    }

    async fn run(&self, task_id: TaskId, task: Task) -> Result<RunSummary, JobFailure> {
        let executed_at = Utc::now();

        let api_key = self.credentials.api_key();
        if api_key.trim().is_empty() {
            let err = ClawJobsError::Configuration(MISSING_KEY_MESSAGE.to_string());
            let run_id = self.record_failure(&task, &err, executed_at).await;
            return Err(JobFailure::from_error(&err, run_id));
        }

        tracing::info!("🤖 Running task '{}' ({})", task.name, task_id);
        let conversation = match self.converse(&task, api_key.trim()).await {
            Ok(c) => c,
            Err(e) => {
                let run_id = self.record_failure(&task, &e, executed_at).await;
                return Err(JobFailure::from_error(&e, run_id));
            }
        };

        let text = conversation.resolved_text();
        let record = RunRecord::success(&task, text.clone(), executed_at);
        let run_id = match self.runs.insert(&record) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("❌ Failed to save run for '{}': {}", task.name, e);
                self.notifier.post_error(&task.name, &e.to_string()).await;
                return Err(JobFailure::from_error(&e, None));
            }
        };

        tracing::info!(
            "✅ Task '{}' finished in {} round(s), stop_reason={}",
            task.name,
            conversation.rounds,
            conversation.stop_reason.as_str()
        );
        self.notifier
            .post_success(&task.name, &preview(&text), run_id)
            .await;

        Ok(RunSummary {
            run_id,
            task_id,
            rounds: conversation.rounds,
            stop_reason: conversation.stop_reason.as_str().to_string(),
            text,
        })
    }

    /// The continuation loop. Transport and HTTP errors abort the whole
    /// invocation; text from earlier rounds is discarded with it.
    async fn converse(
        &self,
        task: &Task,
        api_key: &str,
    ) -> clawjobs_core::error::Result<Conversation> {
        let manifest = build_manifest(task);
        let mut request = MessageRequest {
            model: self.credentials.model(),
            max_tokens: task.max_tokens,
            system: task
                .system_prompt
                .clone()
                .filter(|s| !s.trim().is_empty()),
            tools: manifest.tools,
            messages: vec![Message::user(&task.prompt)],
            beta: manifest.beta,
        };

        let mut text = String::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut rounds = 0;

        while rounds < self.max_rounds {
            rounds += 1;
            let response = self.client.send(api_key, &request).await?;
            for block in &response.content {
                if let Some(t) = block.visible_text() {
                    text.push_str(t);
                }
            }

            stop_reason = response.stop_reason();
            match &stop_reason {
                StopReason::PauseTurn => {
                    tracing::debug!("⏸️ '{}' paused after round {}", task.name, rounds);
                    request.messages.push(Message::assistant_blocks(response.content));
                    request.messages.push(Message::user(CONTINUE_PROMPT));
                }
                StopReason::EndTurn | StopReason::MaxTokens | StopReason::StopSequence => break,
                StopReason::Other(reason) => {
                    tracing::warn!(
                        "⚠️ Unexpected stop_reason '{}' for '{}', keeping output",
                        reason,
                        task.name
                    );
                    break;
                }
            }
        }

        if stop_reason == StopReason::PauseTurn {
            tracing::info!(
                "⏹️ '{}' still paused after {} rounds, keeping partial output",
                task.name,
                rounds
            );
        }

        Ok(Conversation {
            text,
            rounds,
            stop_reason,
        })
    }

    async fn record_failure(
        &self,
        task: &Task,
        err: &ClawJobsError,
        executed_at: chrono::DateTime<Utc>,
    ) -> Option<RunId> {
        let message = err.to_string();
        tracing::warn!("⚠️ Task '{}' failed: {}", task.name, message);

        let run_id = match self
            .runs
            .insert(&RunRecord::failed(task, message.clone(), executed_at))
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!("❌ Failed to save failed run for '{}': {}", task.name, e);
                None
            }
        };
        self.notifier.post_error(&task.name, &message).await;
        run_id
    }
}

/// First [`PREVIEW_CHARS`] characters, never splitting a code point.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by executor and engine tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use clawjobs_core::error::{ClawJobsError, Result};
    use clawjobs_core::traits::{CompletionClient, CredentialStore, NotificationSink};
    use clawjobs_core::types::{ContentBlock, MessageRequest, MessageResponse, RunId};

    pub struct FixedCredentials(pub &'static str);

    impl CredentialStore for FixedCredentials {
        fn api_key(&self) -> String {
            self.0.to_string()
        }
        fn model(&self) -> String {
            "test-model".to_string()
        }
    }

    /// Replays canned responses and records every request it sees.
    #[derive(Default)]
    pub struct ScriptedClient {
        replies: Mutex<VecDeque<Result<MessageResponse>>>,
        pub requests: Mutex<Vec<MessageRequest>>,
    }

    impl ScriptedClient {
        pub fn new(replies: Vec<Result<MessageResponse>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<MessageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn send(&self, _api_key: &str, request: &MessageRequest) -> Result<MessageResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClawJobsError::Transport("script exhausted".into())))
        }
    }

    pub fn reply(text: Option<&str>, stop_reason: &str) -> Result<MessageResponse> {
        let mut content = vec![ContentBlock {
            kind: "server_tool_use".into(),
            fields: serde_json::from_value(serde_json::json!({"id": "srvtoolu_1", "name": "web_search"}))
                .unwrap(),
        }];
        if let Some(t) = text {
            content.push(ContentBlock::text(t));
        }
        Ok(MessageResponse {
            content,
            stop_reason: Some(stop_reason.to_string()),
            ..MessageResponse::default()
        })
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum Posted {
        Success {
            task_name: String,
            preview: String,
            run_id: RunId,
        },
        Error {
            task_name: String,
            error: String,
        },
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub posted: Mutex<Vec<Posted>>,
    }

    impl RecordingSink {
        pub fn posted(&self) -> Vec<Posted> {
            self.posted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn post_success(&self, task_name: &str, preview: &str, run_id: RunId) {
            self.posted.lock().unwrap().push(Posted::Success {
                task_name: task_name.into(),
                preview: preview.into(),
                run_id,
            });
        }

        async fn post_error(&self, task_name: &str, error: &str) {
            self.posted.lock().unwrap().push(Posted::Error {
                task_name: task_name.into(),
                error: error.into(),
            });
        }
    }
}
