//! Messages API wire types: transcript turns, request, response, error body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One content block as returned by the API.
///
/// Only `text` blocks carry user-visible text. Every field besides
/// `type` (`text`, `id`, `name`, `input`, `signature`, ...) is kept in
/// `fields` exactly as received, so an assistant turn goes back unchanged
/// on continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ContentBlock {
    pub fn text(text: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("text".to_string(), Value::String(text.to_string()));
        Self {
            kind: "text".to_string(),
            fields,
        }
    }

    /// Text of a `text` block; `None` for every other block type.
    pub fn visible_text(&self) -> Option<&str> {
        if self.kind == "text" {
            self.fields.get("text").and_then(Value::as_str)
        } else {
            None
        }
    }
}

/// Turn content: a plain string, or a list of structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.to_string()),
        }
    }

    /// Assistant turn echoing the blocks of a previous response verbatim.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// Server-side tool offered to the model (`{type, name}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

/// Body of `POST /v1/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    pub messages: Vec<Message>,
    /// `anthropic-beta` header value; travels with the request, not in it.
    #[serde(skip)]
    pub beta: Option<String>,
}

/// Successful `POST /v1/messages` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl MessageResponse {
    pub fn stop_reason(&self) -> StopReason {
        StopReason::parse(self.stop_reason.as_deref().unwrap_or_default())
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    /// Server tool loop hit its iteration cap; resend to continue.
    PauseTurn,
    Other(String),
}

impl StopReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "pause_turn" => StopReason::PauseTurn,
            other => StopReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::PauseTurn => "pause_turn",
            StopReason::Other(s) => s,
        }
    }
}

/// `{"type":"error","error":{"type":..., "message":...}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(system: Option<&str>, tools: Vec<ToolDefinition>) -> MessageRequest {
        MessageRequest {
            model: "claude-haiku-4-5-20251001".into(),
            max_tokens: 1024,
            system: system.map(String::from),
            tools,
            messages: vec![Message::user("hello")],
            beta: Some("ignored".into()),
        }
    }

    #[test]
    fn test_optional_fields_absent_not_null() {
        let body = serde_json::to_value(request(None, vec![])).unwrap();
        let obj = body.as_object().unwrap();
        assert!(!obj.contains_key("system"));
        assert!(!obj.contains_key("tools"));
        assert!(!obj.contains_key("beta"));
        assert_eq!(obj["max_tokens"], 1024);
        assert_eq!(obj["model"], "claude-haiku-4-5-20251001");
    }

    #[test]
    fn test_system_and_tools_present_when_set() {
        let tools = vec![ToolDefinition {
            kind: "web_search_20260209".into(),
            name: "web_search".into(),
        }];
        let body = serde_json::to_value(request(Some("be brief"), tools)).unwrap();
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["tools"], json!([{"type": "web_search_20260209", "name": "web_search"}]));
    }

    #[test]
    fn test_content_shapes() {
        let user = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(user, json!({"role": "user", "content": "hi"}));

        let assistant =
            serde_json::to_value(Message::assistant_blocks(vec![ContentBlock::text("a")])).unwrap();
        assert_eq!(
            assistant,
            json!({"role": "assistant", "content": [{"type": "text", "text": "a"}]})
        );
    }

    #[test]
    fn test_unknown_blocks_survive_echo() {
        let raw = json!({
            "type": "server_tool_use",
            "id": "srvtoolu_01",
            "name": "web_search",
            "input": {"query": "rust"}
        });
        let block: ContentBlock = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(block.visible_text(), None);
        assert_eq!(serde_json::to_value(&block).unwrap(), raw);
    }

    #[test]
    fn test_null_text_survives_echo() {
        let raw = json!({
            "type": "web_search_tool_result",
            "tool_use_id": "srvtoolu_01",
            "text": null,
            "content": []
        });
        let block: ContentBlock = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(block.visible_text(), None);
        assert_eq!(serde_json::to_value(&block).unwrap(), raw);

        let echoed = Message::assistant_blocks(vec![block]);
        assert_eq!(serde_json::to_value(&echoed).unwrap()["content"][0], raw);
    }

    #[test]
    fn test_response_parse_and_stop_reason() {
        let resp: MessageResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "thinking", "thinking": "..."}, {"type": "text", "text": "Hi"}],
            "model": "m",
            "stop_reason": "pause_turn"
        }))
        .unwrap();
        assert_eq!(resp.stop_reason(), StopReason::PauseTurn);
        assert_eq!(resp.content[1].visible_text(), Some("Hi"));
        assert_eq!(StopReason::parse("refusal"), StopReason::Other("refusal".into()));
    }
}
