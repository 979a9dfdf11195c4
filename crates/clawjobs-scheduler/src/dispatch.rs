//! Notification dispatch — actually sends notifications to configured channels.
//! Supports: Telegram Bot API, HTTP Webhook.

use std::time::Duration;

use clawjobs_core::config::NotifyConfig;

use super::notify::{Notification, NotifyKind};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification target configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyTarget {
    /// Telegram Bot API, sent via `sendMessage`.
    Telegram { bot_token: String, chat_id: String },
    /// Generic HTTP webhook: POST with JSON body.
    Webhook {
        url: String,
        headers: Vec<(String, String)>,
    },
}

/// Dispatch a notification to a target channel.
/// Returns Ok(()) on success, Err(reason) on failure.
pub async fn dispatch(
    client: &reqwest::Client,
    notification: &Notification,
    target: &NotifyTarget,
) -> Result<(), String> {
    match target {
        NotifyTarget::Telegram { bot_token, chat_id } => {
            send_telegram(client, bot_token, chat_id, notification).await
        }
        NotifyTarget::Webhook { url, headers } => {
            send_webhook(client, url, headers, notification).await
        }
    }
}

/// Send notification via Telegram Bot API.
async fn send_telegram(
    client: &reqwest::Client,
    bot_token: &str,
    chat_id: &str,
    notification: &Notification,
) -> Result<(), String> {
    let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);
    let resp = client
        .post(&url)
        .json(&serde_json::json!({
            "chat_id": chat_id,
            "text": telegram_text(notification),
            "parse_mode": "Markdown"
        }))
        .timeout(SEND_TIMEOUT)
        .send()
        .await
        .map_err(|e| format!("Telegram send failed: {e}"))?;

    if resp.status().is_success() {
        tracing::info!("✅ Telegram notification sent: {}", notification.title);
        Ok(())
    } else {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(format!("Telegram API error {status}: {body}"))
    }
}

fn telegram_text(notification: &Notification) -> String {
    let emoji = match notification.kind {
        NotifyKind::Success => "✅",
        NotifyKind::Error => "❌",
    };
    let footer = match notification.run_id {
        Some(id) => format!("_Run #{} • {}_", id, notification.timestamp.format("%H:%M:%S UTC")),
        None => format!("_{}_", notification.timestamp.format("%H:%M:%S UTC")),
    };
    format!(
        "{} *{}*\n\n{}\n\n{}",
        emoji,
        escape_markdown(&notification.title),
        escape_markdown(&notification.body),
        footer
    )
}

/// Send notification via generic HTTP webhook.
async fn send_webhook(
    client: &reqwest::Client,
    url: &str,
    headers: &[(String, String)],
    notification: &Notification,
) -> Result<(), String> {
    let mut req = client
        .post(url)
        .json(&serde_json::json!({
            "title": notification.title,
            "body": notification.body,
            "kind": notification.kind,
            "task": notification.source,
            "run_id": notification.run_id,
            "timestamp": notification.timestamp.to_rfc3339(),
        }))
        .timeout(SEND_TIMEOUT);

    for (key, value) in headers {
        req = req.header(key.as_str(), value.as_str());
    }

    let resp = req
        .send()
        .await
        .map_err(|e| format!("Webhook send failed: {e}"))?;

    if resp.status().is_success() {
        tracing::info!("✅ Webhook notification sent to {}: {}", url, notification.title);
        Ok(())
    } else {
        let status = resp.status();
        Err(format!("Webhook error {status}"))
    }
}

/// Escape Telegram MarkdownV1 special characters.
fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

/// Dispatch to all registered targets, in order.
/// Returns a Vec of (target_name, Result).
pub async fn dispatch_all(
    client: &reqwest::Client,
    notification: &Notification,
    targets: &[(String, NotifyTarget)],
) -> Vec<(String, Result<(), String>)> {
    let mut results = Vec::new();
    for (name, target) in targets {
        let result = dispatch(client, notification, target).await;
        results.push((name.clone(), result));
    }
    results
}

/// Build targets from the `[notify]` config section. Blank fields disable a target.
pub fn targets_from_config(config: &NotifyConfig) -> Vec<(String, NotifyTarget)> {
    let mut targets = Vec::new();

    if !config.telegram_bot_token.trim().is_empty() && !config.telegram_chat_id.trim().is_empty() {
        targets.push((
            "telegram".to_string(),
            NotifyTarget::Telegram {
                bot_token: config.telegram_bot_token.trim().to_string(),
                chat_id: config.telegram_chat_id.trim().to_string(),
            },
        ));
    }

    if !config.webhook_url.trim().is_empty() {
        targets.push((
            "webhook".to_string(),
            NotifyTarget::Webhook {
                url: config.webhook_url.trim().to_string(),
                headers: config
                    .webhook_headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            },
        ));
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyRouter;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_targets_from_config() {
        let mut config = NotifyConfig {
            telegram_bot_token: "123:abc".into(),
            ..NotifyConfig::default()
        };
        // Token without chat id is not a usable target.
        assert!(targets_from_config(&config).is_empty());

        config.telegram_chat_id = "42".into();
        config.webhook_url = " http://localhost/hook ".into();
        config
            .webhook_headers
            .insert("Authorization".into(), "Bearer t0k".into());
        let targets = targets_from_config(&config);
        let names: Vec<_> = targets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["telegram", "webhook"]);
        assert_eq!(
            targets[1].1,
            NotifyTarget::Webhook {
                url: "http://localhost/hook".into(),
                headers: vec![("Authorization".into(), "Bearer t0k".into())]
            }
        );
    }

    #[test]
    fn test_telegram_text_escapes_markdown() {
        let n = NotifyRouter::create(NotifyKind::Error, "daily_report", "bad *key*", None);
        let text = telegram_text(&n);
        assert!(text.starts_with("❌ *daily\\_report failed*"));
        assert!(text.contains("bad \\*key\\*"));
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-token", "t"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let target = NotifyTarget::Webhook {
            url: format!("{}/hook", server.uri()),
            headers: vec![("x-token".into(), "t".into())],
        };
        let n = NotifyRouter::create(NotifyKind::Success, "News", "preview", Some(3));
        dispatch(&reqwest::Client::new(), &n, &target).await.unwrap();

        let received = server.received_requests().await.unwrap_or_default();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["title"], "News completed");
        assert_eq!(body["kind"], "Success");
        assert_eq!(body["run_id"], 3);
    }

    #[tokio::test]
    async fn test_webhook_error_status_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let target = NotifyTarget::Webhook {
            url: server.uri(),
            headers: vec![],
        };
        let n = NotifyRouter::create(NotifyKind::Error, "News", "boom", None);
        let results = dispatch_all(&reqwest::Client::new(), &n, &[("webhook".into(), target)]).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.as_ref().unwrap_err().contains("500"));
    }
}
