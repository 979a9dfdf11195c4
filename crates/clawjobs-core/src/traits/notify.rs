//! Notification sink trait.

use async_trait::async_trait;

use crate::types::RunId;

/// User-visible success/failure presentation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// `preview` is already truncated; `run_id` lets the user open the full result.
    async fn post_success(&self, task_name: &str, preview: &str, run_id: RunId);

    async fn post_error(&self, task_name: &str, error: &str);
}
