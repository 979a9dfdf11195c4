//! Anthropic Messages API client.
//!
//! Stateless per call: the API key and beta header travel with each request,
//! so a single client serves every task. Non-2xx responses are reduced to
//! `HTTP <code>: <detail>` using the best detail available
//! (structured error message → raw body → reason phrase).

use std::time::Duration;

use async_trait::async_trait;
use clawjobs_core::config::ApiConfig;
use clawjobs_core::error::{ClawJobsError, Result};
use clawjobs_core::traits::CompletionClient;
use clawjobs_core::types::{ApiErrorBody, MessageRequest, MessageResponse};
use reqwest::StatusCode;

const MESSAGES_PATH: &str = "/v1/messages";

/// HTTP binding to `POST /v1/messages`.
pub struct AnthropicClient {
    /// Base URL, e.g. `https://api.anthropic.com` (mock server in tests).
    base_url: String,
    /// `anthropic-version` header value.
    api_version: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Build from the `[api]` config section.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.api_version,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn new(
        base_url: &str,
        api_version: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClawJobsError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, MESSAGES_PATH)
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn send(&self, api_key: &str, request: &MessageRequest) -> Result<MessageResponse> {
        let url = self.endpoint();
        let mut req = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.api_version)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(beta) = &request.beta {
            req = req.header("anthropic-beta", beta);
        }

        tracing::debug!(
            "📤 POST {} (model={}, messages={}, tools={})",
            url,
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let resp = req
            .send()
            .await
            .map_err(|e| ClawJobsError::Transport(format!("Request to {url} failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ClawJobsError::Transport(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            let detail = error_detail(status, &body);
            tracing::warn!("⚠️ Messages API returned HTTP {}: {}", status.as_u16(), detail);
            return Err(ClawJobsError::Http {
                status: status.as_u16(),
                detail,
            });
        }

        if body.trim().is_empty() {
            return Err(ClawJobsError::Transport(
                "Empty response body from API".to_string(),
            ));
        }

        serde_json::from_str(&body)
            .map_err(|e| ClawJobsError::Transport(format!("Malformed response body: {e}")))
    }
}

/// Best-available explanation for a failed response.
pub fn error_detail(status: StatusCode, raw_body: &str) -> String {
    let structured = serde_json::from_str::<ApiErrorBody>(raw_body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| e.message)
        .filter(|m| !m.trim().is_empty());

    if let Some(message) = structured {
        return message;
    }
    if !raw_body.trim().is_empty() {
        return raw_body.to_string();
    }
    status.canonical_reason().unwrap_or("Unknown error").to_string()
}
