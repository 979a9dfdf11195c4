//! Completion API trait. One stateless call per request.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MessageRequest, MessageResponse};

/// Binding to the `POST /v1/messages` endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one request. Non-2xx statuses come back as
    /// [`ClawJobsError::Http`](crate::error::ClawJobsError::Http), network
    /// problems as [`ClawJobsError::Transport`](crate::error::ClawJobsError::Transport).
    async fn send(&self, api_key: &str, request: &MessageRequest) -> Result<MessageResponse>;
}
