//! Notification router — logs every job outcome and forwards it to the
//! configured targets (webhook, Telegram).
//! Lightweight: no queues. Delivery failures are logged and dropped.

use async_trait::async_trait;
use clawjobs_core::config::NotifyConfig;
use clawjobs_core::traits::NotificationSink;
use clawjobs_core::types::RunId;
use serde::{Deserialize, Serialize};

use crate::dispatch::{self, NotifyTarget};

/// A notification about one job outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    /// Response preview or error message.
    pub body: String,
    pub kind: NotifyKind,
    /// Task name the notification is about.
    pub source: String,
    /// Run to open for the full result (success only).
    pub run_id: Option<RunId>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotifyKind {
    Success,
    Error,
}

/// The [`NotificationSink`] used by the daemon.
pub struct NotifyRouter {
    targets: Vec<(String, NotifyTarget)>,
    client: reqwest::Client,
}

impl NotifyRouter {
    /// Log-only router.
    pub fn new() -> Self {
        Self::with_targets(Vec::new())
    }

    pub fn with_targets(targets: Vec<(String, NotifyTarget)>) -> Self {
        Self {
            targets,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::with_targets(dispatch::targets_from_config(config))
    }

    pub fn target_names(&self) -> Vec<String> {
        self.targets.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Create a notification.
    pub fn create(
        kind: NotifyKind,
        task_name: &str,
        body: &str,
        run_id: Option<RunId>,
    ) -> Notification {
        let title = match kind {
            NotifyKind::Success => format!("{task_name} completed"),
            NotifyKind::Error => format!("{task_name} failed"),
        };
        Notification {
            title,
            body: body.to_string(),
            kind,
            source: task_name.to_string(),
            run_id,
            timestamp: chrono::Utc::now(),
        }
    }

    async fn deliver(&self, notification: Notification) {
        let results = dispatch::dispatch_all(&self.client, &notification, &self.targets).await;
        for (target, result) in results {
            if let Err(e) = result {
                tracing::warn!("⚠️ Notification to {} failed: {}", target, e);
            }
        }
    }
}

impl Default for NotifyRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for NotifyRouter {
    async fn post_success(&self, task_name: &str, preview: &str, run_id: RunId) {
        tracing::info!("📣 [{}] run #{}: {}", task_name, run_id, preview);
        self.deliver(Self::create(NotifyKind::Success, task_name, preview, Some(run_id)))
            .await;
    }

    async fn post_error(&self, task_name: &str, error: &str) {
        tracing::warn!("📣 [{}] failed: {}", task_name, error);
        self.deliver(Self::create(NotifyKind::Error, task_name, error, None))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_create_titles() {
        let ok = NotifyRouter::create(NotifyKind::Success, "News", "Top stories…", Some(7));
        assert_eq!(ok.title, "News completed");
        assert_eq!(ok.run_id, Some(7));
        let failed = NotifyRouter::create(NotifyKind::Error, "News", "HTTP 500: oops", None);
        assert_eq!(failed.title, "News failed");
        assert_eq!(failed.body, "HTTP 500: oops");
    }

    #[tokio::test]
    async fn test_sink_delivers_to_every_target() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let router = NotifyRouter::with_targets(vec![(
            "webhook".into(),
            NotifyTarget::Webhook {
                url: format!("{}/hook", server.uri()),
                headers: vec![],
            },
        )]);
        router.post_success("News", "Top stories…", 7).await;
        router.post_error("News", "HTTP 500: oops").await;

        let received = server.received_requests().await.unwrap_or_default();
        let kinds: Vec<serde_json::Value> = received
            .iter()
            .map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).unwrap()["kind"].clone())
            .collect();
        assert_eq!(kinds, vec![serde_json::json!("Success"), serde_json::json!("Error")]);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_not_fatal() {
        let router = NotifyRouter::with_targets(vec![(
            "webhook".into(),
            NotifyTarget::Webhook {
                url: "http://127.0.0.1:9/unreachable".into(),
                headers: vec![],
            },
        )]);
        router.post_error("News", "boom").await;
        assert_eq!(router.target_names(), vec!["webhook".to_string()]);
    }

    #[test]
    fn test_from_config_without_targets() {
        let router = NotifyRouter::from_config(&NotifyConfig::default());
        assert!(router.target_names().is_empty());
    }
}
